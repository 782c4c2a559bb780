use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use uuid::Uuid;

use super::models::{FeedFollowRecord, FeedRecord, NewFeed, NewPost, PostRecord, UserRecord};
use super::FeedStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation { .. })
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(database_error) = &error {
            if database_error.is_unique_violation() {
                let constraint = database_error
                    .constraint()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| database_error.message().to_string());
                return StorageError::UniqueViolation { constraint };
            }
        }
        StorageError::Database(error)
    }
}

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";
const POST_COLUMNS: &str =
    "id, title, url, description, published_at, feed_id, created_at, updated_at";
const FOLLOW_SELECT: &str = r#"
    SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name, f.name AS feed_name,
           f.url AS feed_url, ff.created_at, ff.updated_at
    FROM feed_follows ff
    JOIN users u ON u.id = ff.user_id
    JOIN feeds f ON f.id = ff.feed_id
"#;

#[derive(Debug, Clone)]
pub struct FeedRepository {
    pool: SqlitePool,
}

impl FeedRepository {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_user(&self, name: &str) -> Result<UserRecord, StorageError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<UserRecord>, StorageError> {
        let row = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        let rows = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY created_at ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Deletes every user. Their feeds, follows and posts go with them.
    pub async fn reset(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn create_feed(&self, feed: &NewFeed) -> Result<FeedRecord, StorageError> {
        Ok(insert_feed(&self.pool, feed).await?)
    }

    /// Creates the feed and has its owner follow it, in one transaction.
    pub async fn add_feed(
        &self,
        feed: &NewFeed,
    ) -> Result<(FeedRecord, FeedFollowRecord), StorageError> {
        let mut tx = self.pool.begin().await?;
        let record = insert_feed(&mut *tx, feed).await?;
        let follow_id = insert_feed_follow(&mut *tx, feed.user_id, record.id).await?;
        tx.commit().await?;

        let follow = self.get_feed_follow(follow_id).await?;
        Ok((record, follow))
    }

    pub async fn get_feed(&self, id: Uuid) -> Result<Option<FeedRecord>, StorageError> {
        let row = sqlx::query_as::<_, FeedRecord>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<FeedRecord>, StorageError> {
        let row = sqlx::query_as::<_, FeedRecord>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_feeds(&self) -> Result<Vec<FeedRecord>, StorageError> {
        let rows = sqlx::query_as::<_, FeedRecord>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_posts_for_feed(
        &self,
        feed_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PostRecord>, StorageError> {
        let rows = sqlx::query_as::<_, PostRecord>(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts
            WHERE feed_id = ?1
            ORDER BY published_at DESC, id ASC
            LIMIT ?2
            "#
        ))
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Fails with [`StorageError::UniqueViolation`] when the user already follows the feed.
    pub async fn create_feed_follow(
        &self,
        user_id: Uuid,
        feed_id: Uuid,
    ) -> Result<FeedFollowRecord, StorageError> {
        let follow_id = insert_feed_follow(&self.pool, user_id, feed_id).await?;
        self.get_feed_follow(follow_id).await
    }

    /// Returns `false` when the user was not following the feed.
    pub async fn delete_feed_follow(
        &self,
        user_id: Uuid,
        feed_id: Uuid,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ?1 AND feed_id = ?2")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_feed_follows_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<FeedFollowRecord>, StorageError> {
        let rows = sqlx::query_as::<_, FeedFollowRecord>(&format!(
            "{FOLLOW_SELECT} WHERE ff.user_id = ?1 ORDER BY ff.created_at ASC, f.name ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_feed_follow(&self, id: Uuid) -> Result<FeedFollowRecord, StorageError> {
        let row = sqlx::query_as::<_, FeedFollowRecord>(&format!("{FOLLOW_SELECT} WHERE ff.id = ?1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    /// Newest posts across every feed the user follows.
    pub async fn list_posts_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PostRecord>, StorageError> {
        let rows = sqlx::query_as::<_, PostRecord>(
            r#"
            SELECT p.id, p.title, p.url, p.description, p.published_at, p.feed_id, p.created_at, p.updated_at
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?1
            ORDER BY p.published_at DESC, p.id ASC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn insert_feed<'e, E>(executor: E, feed: &NewFeed) -> Result<FeedRecord, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    sqlx::query_as::<_, FeedRecord>(&format!(
        r#"
        INSERT INTO feeds (id, name, url, user_id, last_fetched_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)
        RETURNING {FEED_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&feed.name)
    .bind(&feed.url)
    .bind(feed.user_id)
    .bind(now)
    .fetch_one(executor)
    .await
}

async fn insert_feed_follow<'e, E>(
    executor: E,
    user_id: Uuid,
    feed_id: Uuid,
) -> Result<Uuid, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(feed_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(id)
}

impl FeedStore for FeedRepository {
    async fn next_feed_to_fetch(&self) -> Result<Option<FeedRecord>, StorageError> {
        let row = sqlx::query_as::<_, FeedRecord>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET last_fetched_at = ?1,
                updated_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(fetched_at)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_post(&self, post: &NewPost) -> Result<PostRecord, StorageError> {
        let record = sqlx::query_as::<_, PostRecord>(&format!(
            r#"
            INSERT INTO posts (id, title, url, description, published_at, feed_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(post.feed_id)
        .bind(post.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }
}
