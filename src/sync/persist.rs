use chrono::Utc;
use uuid::Uuid;

use super::shutdown::ShutdownSignal;
use crate::feed::dates::normalize_published;
use crate::feed::types::FeedItem;
use crate::storage::models::NewPost;
use crate::storage::FeedStore;

/// What happened to each item of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub undated: usize,
    pub failed: usize,
}

impl PersistReport {
    pub fn seen(&self) -> usize {
        self.inserted + self.duplicates + self.undated + self.failed
    }
}

/// Appends `items` to the store as posts of `feed_id`.
///
/// Every failure is scoped to its item: unparseable dates and store errors are
/// logged and skipped, duplicate URLs are skipped silently. A triggered
/// `shutdown` stops the batch between items; posts already written stay.
pub async fn persist_items<S: FeedStore>(
    store: &S,
    feed_id: Uuid,
    items: &[FeedItem],
    shutdown: &ShutdownSignal,
) -> PersistReport {
    let mut report = PersistReport::default();

    for item in items {
        if shutdown.is_triggered() {
            tracing::debug!(%feed_id, persisted = report.seen(), "shutdown requested, stopping batch");
            break;
        }

        let published_at = match normalize_published(&item.pub_date) {
            Ok(timestamp) => timestamp.with_timezone(&Utc),
            Err(error) => {
                tracing::warn!(link = %item.link, "skipping item: {}", error);
                report.undated += 1;
                continue;
            }
        };

        let post = NewPost {
            id: Uuid::new_v4(),
            title: item.title.clone(),
            url: item.link.clone(),
            description: item.description.clone(),
            published_at,
            feed_id,
            created_at: Utc::now(),
        };

        match store.create_post(&post).await {
            Ok(_) => report.inserted += 1,
            Err(error) if error.is_unique_violation() => report.duplicates += 1,
            Err(error) => {
                tracing::error!(link = %item.link, "failed to save post: {}", error);
                report.failed += 1;
            }
        }
    }

    report
}
