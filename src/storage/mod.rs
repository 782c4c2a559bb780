pub mod models;
pub mod repository;

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::{FeedRecord, NewPost, PostRecord};
pub use repository::{FeedRepository, StorageError};

/// The queries the aggregation loop needs from persistence.
pub trait FeedStore: Send + Sync {
    /// The feed fetched longest ago, never-fetched feeds first. `None` when no feeds exist.
    fn next_feed_to_fetch(
        &self,
    ) -> impl Future<Output = Result<Option<FeedRecord>, StorageError>> + Send;

    fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        fetched_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Fails with [`StorageError::UniqueViolation`] when a post with the same URL exists.
    fn create_post(
        &self,
        post: &NewPost,
    ) -> impl Future<Output = Result<PostRecord, StorageError>> + Send;
}
