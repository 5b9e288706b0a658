//! Feed aggregation for Gator.
//!
//! Fetching, storage, ingestion and scheduling of RSS feeds, plus the
//! user-facing feed management service.

pub mod fetcher;
pub mod ingestor;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;

pub use fetcher::{parse_feed, unescape_html, validate_url, FeedFetcher, FetchError, FetchFeed};
pub use ingestor::PostIngestor;
pub use repository::{FeedFollowRepository, FeedRepository, PostRepository};
pub use scheduler::{
    shutdown_channel, CycleOutcome, Scheduler, SchedulerState, Shutdown, ShutdownHandle,
    DEFAULT_FETCH_TIMEOUT,
};
pub use service::{FeedService, ResetSummary};
pub use store::{FeedStore, SqliteFeedStore};
pub use types::{
    AtomLink, Feed, FeedFollow, FeedWithOwner, IngestReport, InsertOutcome, NewFeed, NewPost,
    ParsedFeed, ParsedItem, Post, SkipReason, SkippedItem, DEFAULT_BROWSE_LIMIT,
    MAX_FEED_NAME_LENGTH,
};
