//! Post ingestion with URL deduplication.

use tracing::{debug, warn};

use super::store::FeedStore;
use super::types::{
    Feed, IngestReport, InsertOutcome, NewPost, ParsedFeed, SkipReason, SkippedItem,
};
use crate::datetime::parse_published_at;
use crate::Result;

/// Turns parsed feed items into stored posts.
pub struct PostIngestor<'a, S: FeedStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: FeedStore + ?Sized> PostIngestor<'a, S> {
    /// Create an ingestor writing to `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Store every item of `parsed` whose URL is not stored yet.
    ///
    /// Items without a link or a title are skipped. An unparsable
    /// publication date leaves `published_at` empty. Any storage error other
    /// than a duplicate URL aborts the run; posts inserted before it stay.
    pub async fn ingest(&self, feed: &Feed, parsed: &ParsedFeed) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for (index, item) in parsed.items.iter().enumerate() {
            let url = item.link.trim();
            let title = item.title.trim();

            let reason = if url.is_empty() {
                Some(SkipReason::MissingUrl)
            } else if title.is_empty() {
                Some(SkipReason::MissingTitle)
            } else {
                None
            };
            if let Some(reason) = reason {
                debug!(feed_id = feed.id, index, %reason, "Skipping item");
                report.skipped.push(SkippedItem {
                    index,
                    title: title.to_string(),
                    reason,
                });
                continue;
            }

            let published_at = parse_published_at(&item.pub_date);
            if published_at.is_none() && !item.pub_date.trim().is_empty() {
                warn!(
                    feed_id = feed.id,
                    url,
                    pub_date = %item.pub_date,
                    "Unparsable publication date, storing post without one"
                );
            }

            let post = NewPost::new(feed.id, title, url)
                .with_description(item.description.trim())
                .with_published_at(published_at);

            match self.store.insert_post(&post).await? {
                InsertOutcome::Inserted(id) => {
                    debug!(feed_id = feed.id, post_id = id, url, "Stored post");
                    report.inserted += 1;
                }
                InsertOutcome::Duplicate => {
                    report.duplicates += 1;
                }
            }
        }

        Ok(report)
    }
}
