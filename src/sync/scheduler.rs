use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::persist::{persist_items, PersistReport};
use super::shutdown::ShutdownSignal;
use crate::feed::fetcher::{fetch_feed, FetchError};
use crate::feed::parser::{parse_feed_bytes, FeedParseError};
use crate::storage::{FeedStore, StorageError};

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub fetch_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: Uuid,
    pub feed_name: String,
    pub items: usize,
    pub persisted: PersistReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No feeds exist yet.
    Idle,
    Completed(CycleReport),
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("failed to get next feed to fetch: {0}")]
    NextFeed(#[source] StorageError),
    #[error("failed to fetch feed {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to parse feed {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: FeedParseError,
    },
}

impl CycleError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            CycleError::Fetch {
                source: FetchError::Cancelled,
                ..
            }
        )
    }
}

/// The aggregation loop: one feed per tick, least recently fetched first.
#[derive(Debug)]
pub struct Aggregator<S> {
    store: S,
    client: reqwest::Client,
    config: AggregatorConfig,
}

impl<S: FeedStore> Aggregator<S> {
    pub fn new(store: S, client: reqwest::Client, config: AggregatorConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one fetch → parse → persist cycle.
    ///
    /// The feed is marked fetched before the request goes out, so a feed that
    /// fails still moves to the back of the queue.
    pub async fn run_cycle(&self, shutdown: &ShutdownSignal) -> Result<CycleOutcome, CycleError> {
        let Some(feed) = self
            .store
            .next_feed_to_fetch()
            .await
            .map_err(CycleError::NextFeed)?
        else {
            tracing::debug!("no feeds to fetch");
            return Ok(CycleOutcome::Idle);
        };
        tracing::debug!(feed = %feed.name, url = %feed.url, "fetching feed");

        if let Err(error) = self.store.mark_feed_fetched(feed.id, Utc::now()).await {
            tracing::warn!(feed = %feed.name, "failed to mark feed fetched: {}", error);
        }

        let fetched = fetch_feed(&self.client, &feed.url, self.config.fetch_timeout, shutdown)
            .await
            .map_err(|source| CycleError::Fetch {
                url: feed.url.clone(),
                source,
            })?;
        tracing::debug!(
            feed = %feed.name,
            bytes = fetched.body.len(),
            content_type = fetched.content_type.as_deref().unwrap_or("unknown"),
            "feed downloaded"
        );
        let document = parse_feed_bytes(&fetched.body).map_err(|source| CycleError::Parse {
            url: feed.url.clone(),
            source,
        })?;

        let persisted = persist_items(&self.store, feed.id, &document.items, shutdown).await;
        tracing::info!(
            feed = %feed.name,
            items = document.items.len(),
            inserted = persisted.inserted,
            duplicates = persisted.duplicates,
            skipped = persisted.undated + persisted.failed,
            "feed collected"
        );

        Ok(CycleOutcome::Completed(CycleReport {
            feed_id: feed.id,
            feed_name: feed.name,
            items: document.items.len(),
            persisted,
        }))
    }

    /// Runs cycles every `every` until `shutdown` fires. The first cycle starts
    /// immediately; ticks missed during a slow cycle collapse into one.
    pub async fn run(&self, every: Duration, shutdown: ShutdownSignal) {
        tracing::info!("collecting feeds every {:?}", every);
        let mut timer = tokio::time::interval(every.max(Duration::from_millis(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            match self.run_cycle(&shutdown).await {
                Ok(_) => {}
                Err(error) if error.is_cancelled() => {
                    tracing::info!("in-flight fetch cancelled");
                }
                Err(error) => tracing::error!("{}", error),
            }

            if shutdown.is_triggered() {
                break;
            }
        }

        tracing::info!("aggregator stopped");
    }
}
