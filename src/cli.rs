use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{parse_duration, save_current_user, Config, ConfigError};
use crate::feed::fetcher::build_client;
use crate::storage::models::{FeedRecord, NewFeed, UserRecord};
use crate::storage::{FeedRepository, StorageError};
use crate::sync::{Aggregator, AggregatorConfig, ShutdownSignal};

const DEFAULT_BROWSE_LIMIT: i64 = 2;

#[derive(Debug, Parser)]
#[command(name = "gator", version, about = "Collects RSS feeds into a local database")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch to an existing user
    Login { name: String },
    /// List users, marking the current one
    Users,
    /// Delete every user along with their feeds and posts
    Reset,
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List every feed and who added it
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// Stop following a feed by URL
    Unfollow { url: String },
    /// List the feeds the current user follows
    Following,
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
    },
    /// Fetch one feed per interval until interrupted
    Agg {
        /// Time between fetches, such as `30s` or `1m`
        #[arg(value_parser = parse_interval)]
        interval: Option<Duration>,
    },
}

fn parse_interval(raw: &str) -> Result<Duration, String> {
    parse_duration(raw).ok_or_else(|| format!("invalid interval: {raw}"))
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("not logged in, run `gator register <name>` or `gator login <name>` first")]
    NotLoggedIn,
    #[error("user {0} does not exist")]
    UnknownUser(String),
    #[error("user {0} already exists")]
    UserExists(String),
    #[error("feed {0} already exists")]
    FeedExists(String),
    #[error("no feed with url {0}")]
    UnknownFeed(String),
    #[error("already following {0}")]
    AlreadyFollowing(String),
    #[error("not following {0}")]
    NotFollowing(String),
}

/// Runs commands against one database on behalf of the configured user.
#[derive(Debug)]
pub struct Session {
    repository: FeedRepository,
    config: Config,
    config_path: Option<PathBuf>,
}

impl Session {
    pub fn new(repository: FeedRepository, config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            repository,
            config,
            config_path,
        }
    }

    pub fn current_user_name(&self) -> Option<&str> {
        self.config.current_user_name.as_deref()
    }

    pub async fn execute<W: Write>(
        &mut self,
        command: Command,
        out: &mut W,
        shutdown: ShutdownSignal,
    ) -> Result<(), CliError> {
        match command {
            Command::Register { name } => self.register(&name, out).await,
            Command::Login { name } => self.login(&name, out).await,
            Command::Users => self.users(out).await,
            Command::Reset => self.reset(out).await,
            Command::Addfeed { name, url } => self.add_feed(name, url, out).await,
            Command::Feeds => self.feeds(out).await,
            Command::Follow { url } => self.follow(&url, out).await,
            Command::Unfollow { url } => self.unfollow(&url, out).await,
            Command::Following => self.following(out).await,
            Command::Browse { limit } => self.browse(limit, out).await,
            Command::Agg { interval } => self.aggregate(interval, shutdown).await,
        }
    }

    async fn register<W: Write>(&mut self, name: &str, out: &mut W) -> Result<(), CliError> {
        let user = match self.repository.create_user(name).await {
            Ok(user) => user,
            Err(error) if error.is_unique_violation() => {
                return Err(CliError::UserExists(name.to_string()))
            }
            Err(error) => return Err(error.into()),
        };
        self.remember_user(&user.name)?;
        writeln!(out, "registered and logged in as {}", user.name)?;
        Ok(())
    }

    async fn login<W: Write>(&mut self, name: &str, out: &mut W) -> Result<(), CliError> {
        let user = self
            .repository
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| CliError::UnknownUser(name.to_string()))?;
        self.remember_user(&user.name)?;
        writeln!(out, "logged in as {}", user.name)?;
        Ok(())
    }

    async fn users<W: Write>(&self, out: &mut W) -> Result<(), CliError> {
        for user in self.repository.list_users().await? {
            if Some(user.name.as_str()) == self.current_user_name() {
                writeln!(out, "* {} (current)", user.name)?;
            } else {
                writeln!(out, "* {}", user.name)?;
            }
        }
        Ok(())
    }

    async fn reset<W: Write>(&self, out: &mut W) -> Result<(), CliError> {
        let removed = self.repository.reset().await?;
        writeln!(out, "removed {removed} users")?;
        Ok(())
    }

    async fn add_feed<W: Write>(
        &self,
        name: String,
        url: String,
        out: &mut W,
    ) -> Result<(), CliError> {
        let user = self.current_user().await?;
        let new_feed = NewFeed {
            name,
            url,
            user_id: user.id,
        };
        let (feed, follow) = match self.repository.add_feed(&new_feed).await {
            Ok(added) => added,
            Err(error) if error.is_unique_violation() => {
                return Err(CliError::FeedExists(new_feed.url))
            }
            Err(error) => return Err(error.into()),
        };
        writeln!(out, "added feed {} ({})", feed.name, feed.url)?;
        writeln!(out, "{} follows {}", follow.user_name, follow.feed_name)?;
        Ok(())
    }

    async fn feeds<W: Write>(&self, out: &mut W) -> Result<(), CliError> {
        let owners: HashMap<_, _> = self
            .repository
            .list_users()
            .await?
            .into_iter()
            .map(|user| (user.id, user.name))
            .collect();
        for feed in self.repository.list_feeds().await? {
            let owner = owners.get(&feed.user_id).map(String::as_str).unwrap_or("unknown");
            writeln!(out, "- {}", feed.name)?;
            writeln!(out, "  url: {}", feed.url)?;
            writeln!(out, "  added by: {owner}")?;
        }
        Ok(())
    }

    async fn follow<W: Write>(&self, url: &str, out: &mut W) -> Result<(), CliError> {
        let user = self.current_user().await?;
        let feed = self.feed_by_url(url).await?;
        let follow = match self.repository.create_feed_follow(user.id, feed.id).await {
            Ok(follow) => follow,
            Err(error) if error.is_unique_violation() => {
                return Err(CliError::AlreadyFollowing(url.to_string()))
            }
            Err(error) => return Err(error.into()),
        };
        writeln!(out, "{} follows {}", follow.user_name, follow.feed_name)?;
        Ok(())
    }

    async fn unfollow<W: Write>(&self, url: &str, out: &mut W) -> Result<(), CliError> {
        let user = self.current_user().await?;
        let feed = self.feed_by_url(url).await?;
        if !self.repository.delete_feed_follow(user.id, feed.id).await? {
            return Err(CliError::NotFollowing(url.to_string()));
        }
        writeln!(out, "{} unfollowed {}", user.name, feed.name)?;
        Ok(())
    }

    async fn following<W: Write>(&self, out: &mut W) -> Result<(), CliError> {
        let user = self.current_user().await?;
        let follows = self.repository.list_feed_follows_for_user(user.id).await?;
        writeln!(out, "{} follows:", user.name)?;
        for follow in follows {
            writeln!(out, "- {}", follow.feed_name)?;
        }
        Ok(())
    }

    async fn browse<W: Write>(&self, limit: i64, out: &mut W) -> Result<(), CliError> {
        let user = self.current_user().await?;
        for post in self.repository.list_posts_for_user(user.id, limit).await? {
            writeln!(out, "--------------------------------")?;
            writeln!(out, "Title: {}", post.title)?;
            writeln!(out, "URL: {}", post.url)?;
            if let Some(description) = &post.description {
                writeln!(out, "Description: {description}")?;
            }
            writeln!(out, "Published: {}", post.published_at.to_rfc2822())?;
        }
        Ok(())
    }

    async fn aggregate(
        &self,
        interval: Option<Duration>,
        shutdown: ShutdownSignal,
    ) -> Result<(), CliError> {
        let aggregator = Aggregator::new(
            self.repository.clone(),
            build_client()?,
            AggregatorConfig {
                fetch_timeout: self.config.fetch_timeout,
            },
        );
        aggregator
            .run(interval.unwrap_or(self.config.fetch_interval), shutdown)
            .await;
        Ok(())
    }

    async fn current_user(&self) -> Result<UserRecord, CliError> {
        let name = self.current_user_name().ok_or(CliError::NotLoggedIn)?;
        self.repository
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| CliError::UnknownUser(name.to_string()))
    }

    async fn feed_by_url(&self, url: &str) -> Result<FeedRecord, CliError> {
        self.repository
            .get_feed_by_url(url)
            .await?
            .ok_or_else(|| CliError::UnknownFeed(url.to_string()))
    }

    fn remember_user(&mut self, name: &str) -> Result<(), CliError> {
        let path = self.config_path.as_deref().ok_or(ConfigError::NoConfigPath)?;
        save_current_user(path, name)?;
        self.config.current_user_name = Some(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE_NAME;
    use crate::storage::models::NewPost;
    use crate::storage::FeedStore;
    use crate::sync::Shutdown;
    use chrono::Utc;
    use uuid::Uuid;

    struct Harness {
        session: Session,
        signal: ShutdownSignal,
        _shutdown: Shutdown,
        dir: tempfile::TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let repository = FeedRepository::connect("sqlite::memory:")
                .await
                .expect("connect must succeed");
            let session = Session::new(
                repository,
                Config::default(),
                Some(dir.path().join(CONFIG_FILE_NAME)),
            );
            let (shutdown, signal) = Shutdown::new();
            Self {
                session,
                signal,
                _shutdown: shutdown,
                dir,
            }
        }

        async fn run(&mut self, args: &[&str]) -> Result<String, CliError> {
            let cli = Cli::try_parse_from(std::iter::once("gator").chain(args.iter().copied()))
                .expect("arguments must parse");
            let mut out = Vec::new();
            self.session
                .execute(cli.command, &mut out, self.signal.clone())
                .await?;
            Ok(String::from_utf8(out).expect("utf-8 output"))
        }

        async fn seed_post(&self, feed_url: &str, post_url: &str, title: &str) {
            let repository = &self.session.repository;
            let feed = repository
                .get_feed_by_url(feed_url)
                .await
                .expect("get feed")
                .expect("feed exists");
            repository
                .create_post(&NewPost {
                    id: Uuid::new_v4(),
                    title: title.to_string(),
                    url: post_url.to_string(),
                    description: None,
                    published_at: Utc::now(),
                    feed_id: feed.id,
                    created_at: Utc::now(),
                })
                .await
                .expect("insert post");
        }
    }

    #[test]
    fn parses_subcommands_and_defaults() {
        let cli = Cli::try_parse_from(["gator", "addfeed", "Lane's Blog", "https://blog.example.com/index.xml"])
            .expect("addfeed must parse");
        assert_eq!(
            cli.command,
            Command::Addfeed {
                name: "Lane's Blog".to_string(),
                url: "https://blog.example.com/index.xml".to_string(),
            }
        );

        let cli = Cli::try_parse_from(["gator", "browse"]).expect("browse must parse");
        assert_eq!(cli.command, Command::Browse { limit: 2 });

        let cli = Cli::try_parse_from(["gator", "agg", "1m30s"]).expect("agg must parse");
        assert_eq!(
            cli.command,
            Command::Agg {
                interval: Some(Duration::from_secs(90))
            }
        );

        let cli = Cli::try_parse_from(["gator", "agg"]).expect("agg must parse");
        assert_eq!(cli.command, Command::Agg { interval: None });
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["gator", "agg", "soon"]).is_err());
        assert!(Cli::try_parse_from(["gator", "agg", "1m", "2m"]).is_err());
        assert!(Cli::try_parse_from(["gator", "browse", "0"]).is_err());
        assert!(Cli::try_parse_from(["gator", "follow"]).is_err());
        assert!(Cli::try_parse_from(["gator", "scrape"]).is_err());
    }

    #[tokio::test]
    async fn register_logs_in_and_saves_current_user() {
        let mut harness = Harness::new().await;

        let output = harness.run(&["register", "lane"]).await.expect("register");

        assert_eq!(output, "registered and logged in as lane\n");
        assert_eq!(harness.session.current_user_name(), Some("lane"));
        let saved = Config::load_from(Some(harness.dir.path().join(CONFIG_FILE_NAME).as_path()), |_: &str| None)
            .expect("load saved config");
        assert_eq!(saved.current_user_name.as_deref(), Some("lane"));

        let error = harness
            .run(&["register", "lane"])
            .await
            .expect_err("second register must fail");
        assert!(matches!(error, CliError::UserExists(name) if name == "lane"));
    }

    #[tokio::test]
    async fn login_requires_an_existing_user() {
        let mut harness = Harness::new().await;
        harness.run(&["register", "lane"]).await.expect("register");
        harness.run(&["register", "kahya"]).await.expect("register");

        let error = harness
            .run(&["login", "nobody"])
            .await
            .expect_err("unknown user must fail");
        assert!(matches!(error, CliError::UnknownUser(_)));
        assert_eq!(harness.session.current_user_name(), Some("kahya"));

        harness.run(&["login", "lane"]).await.expect("login");
        let users = harness.run(&["users"]).await.expect("users");
        assert_eq!(users, "* lane (current)\n* kahya\n");
    }

    #[tokio::test]
    async fn user_commands_need_a_login() {
        let mut harness = Harness::new().await;

        let cases: [&[&str]; 3] = [&["following"], &["browse"], &["follow", "https://a.example.com/rss"]];
        for args in cases {
            let error = harness.run(args).await.expect_err("must need a login");
            assert!(matches!(error, CliError::NotLoggedIn), "{args:?}");
        }
    }

    #[tokio::test]
    async fn browse_shows_posts_from_followed_feeds_only() {
        let mut harness = Harness::new().await;
        harness.run(&["register", "lane"]).await.expect("register");
        let added = harness
            .run(&["addfeed", "Lane's Blog", "https://blog.example.com/index.xml"])
            .await
            .expect("addfeed");
        assert_eq!(
            added,
            "added feed Lane's Blog (https://blog.example.com/index.xml)\nlane follows Lane's Blog\n"
        );
        harness
            .seed_post(
                "https://blog.example.com/index.xml",
                "https://blog.example.com/posts/zen",
                "The Zen of Proverbs",
            )
            .await;

        let browsed = harness.run(&["browse"]).await.expect("browse");
        assert!(browsed.contains("Title: The Zen of Proverbs"));
        assert!(browsed.contains("URL: https://blog.example.com/posts/zen"));

        harness.run(&["register", "kahya"]).await.expect("register");
        assert_eq!(harness.run(&["browse"]).await.expect("browse"), "");

        harness
            .run(&["follow", "https://blog.example.com/index.xml"])
            .await
            .expect("follow");
        let browsed = harness.run(&["browse", "5"]).await.expect("browse");
        assert!(browsed.contains("Title: The Zen of Proverbs"));
    }

    #[tokio::test]
    async fn follow_and_unfollow_update_following() {
        let mut harness = Harness::new().await;
        harness.run(&["register", "lane"]).await.expect("register");
        harness
            .run(&["addfeed", "A", "https://a.example.com/rss"])
            .await
            .expect("addfeed");
        harness.run(&["register", "kahya"]).await.expect("register");

        let error = harness
            .run(&["follow", "https://missing.example.com/rss"])
            .await
            .expect_err("unknown feed must fail");
        assert!(matches!(error, CliError::UnknownFeed(_)));

        let followed = harness
            .run(&["follow", "https://a.example.com/rss"])
            .await
            .expect("follow");
        assert_eq!(followed, "kahya follows A\n");
        let error = harness
            .run(&["follow", "https://a.example.com/rss"])
            .await
            .expect_err("second follow must fail");
        assert!(matches!(error, CliError::AlreadyFollowing(_)));
        assert_eq!(
            harness.run(&["following"]).await.expect("following"),
            "kahya follows:\n- A\n"
        );

        harness
            .run(&["unfollow", "https://a.example.com/rss"])
            .await
            .expect("unfollow");
        assert_eq!(
            harness.run(&["following"]).await.expect("following"),
            "kahya follows:\n"
        );
        let error = harness
            .run(&["unfollow", "https://a.example.com/rss"])
            .await
            .expect_err("not following any more");
        assert!(matches!(error, CliError::NotFollowing(_)));
    }

    #[tokio::test]
    async fn feeds_lists_owner_and_reset_clears_everything() {
        let mut harness = Harness::new().await;
        harness.run(&["register", "lane"]).await.expect("register");
        harness
            .run(&["addfeed", "A", "https://a.example.com/rss"])
            .await
            .expect("addfeed");
        let error = harness
            .run(&["addfeed", "A again", "https://a.example.com/rss"])
            .await
            .expect_err("duplicate feed must fail");
        assert!(matches!(error, CliError::FeedExists(_)));

        assert_eq!(
            harness.run(&["feeds"]).await.expect("feeds"),
            "- A\n  url: https://a.example.com/rss\n  added by: lane\n"
        );

        assert_eq!(harness.run(&["reset"]).await.expect("reset"), "removed 1 users\n");
        assert_eq!(harness.run(&["feeds"]).await.expect("feeds"), "");
        assert_eq!(harness.run(&["users"]).await.expect("users"), "");
    }
}
