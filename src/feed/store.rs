//! Storage interface consumed by the polling core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::repository::{FeedRepository, PostRepository};
use super::types::{Feed, InsertOutcome, NewPost};
use crate::db::{Database, DbPool};
use crate::{GatorError, Result};

/// Persistence operations used by the scheduler and the ingestor.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The feed polled longest ago. Never-polled feeds come first, ties go
    /// to the lowest ID. `None` when there are no feeds.
    async fn select_oldest_unfetched_feed(&self) -> Result<Option<Feed>>;

    /// Set `last_fetched_at` and `updated_at` of a feed.
    async fn update_feed_fetched_timestamp(&self, feed_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Insert a post, reporting a URL collision as a duplicate.
    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome>;

    /// Feeds a user follows, ordered by name then ID.
    async fn list_feeds_followed_by(&self, user_id: i64) -> Result<Vec<Feed>>;

    /// Pick the next feed to poll.
    async fn next_feed_to_poll(&self) -> Result<Option<Feed>> {
        self.select_oldest_unfetched_feed().await
    }

    /// Record that a feed was picked for polling at `at`.
    async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.update_feed_fetched_timestamp(feed_id, at).await
    }
}

/// SQLite-backed feed store.
#[derive(Clone)]
pub struct SqliteFeedStore {
    pool: DbPool,
}

impl SqliteFeedStore {
    /// Create a store sharing the pool of `db`.
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn select_oldest_unfetched_feed(&self) -> Result<Option<Feed>> {
        FeedRepository::new(&self.pool).select_oldest_fetched().await
    }

    async fn update_feed_fetched_timestamp(&self, feed_id: i64, at: DateTime<Utc>) -> Result<()> {
        if FeedRepository::new(&self.pool).mark_fetched(feed_id, at).await? {
            Ok(())
        } else {
            Err(GatorError::NotFound(format!("feed {feed_id}")))
        }
    }

    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome> {
        PostRepository::new(&self.pool).insert(post).await
    }

    async fn list_feeds_followed_by(&self, user_id: i64) -> Result<Vec<Feed>> {
        FeedRepository::new(&self.pool).list_followed_by(user_id).await
    }
}
