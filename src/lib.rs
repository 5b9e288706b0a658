//! Gator - RSS feed aggregator
//!
//! Polls registered feeds one at a time, least recently fetched first, and
//! stores every newly seen post exactly once per URL.

pub mod cli;
pub mod clock;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, PollInterval};
pub use db::{Database, NewUser, User, UserRepository};
pub use error::{GatorError, Result};
pub use feed::{
    CycleOutcome, Feed, FeedFetcher, FeedService, FeedStore, FetchError, FetchFeed, IngestReport,
    ParsedFeed, Post, PostIngestor, Scheduler, SqliteFeedStore,
};
