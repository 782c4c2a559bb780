//! Feed aggregation for the `gator` command line: pick the least recently
//! fetched feed, download and parse it, and append its new items as posts.
//! Users register, add and follow feeds, and browse posts from what they follow.

pub mod cli;
pub mod config;
pub mod feed;
pub mod storage;
pub mod sync;

pub use cli::{Cli, CliError, Command, Session};
pub use config::{Config, ConfigError};
pub use feed::dates::{normalize_published, DateParseError};
pub use feed::fetcher::{build_client, fetch_feed, FetchError, FetchedFeed, FEED_USER_AGENT};
pub use feed::parser::{parse_feed_bytes, FeedParseError};
pub use feed::types::{FeedDocument, FeedFormat, FeedItem};
pub use storage::{FeedRepository, FeedStore, StorageError};
pub use sync::{Aggregator, AggregatorConfig, CycleError, CycleOutcome, Shutdown, ShutdownSignal};
