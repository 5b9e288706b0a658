//! Feed types for Gator.

use chrono::{DateTime, Utc};

/// Maximum length of a feed name.
pub const MAX_FEED_NAME_LENGTH: usize = 128;

/// Default number of posts shown by `browse`.
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

/// A registered feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// Feed ID.
    pub id: i64,
    /// Display name chosen when the feed was added.
    pub name: String,
    /// Feed URL. Unique across all feeds.
    pub url: String,
    /// ID of the user who added the feed.
    pub user_id: i64,
    /// When the feed was created.
    pub created_at: DateTime<Utc>,
    /// When the feed was last updated.
    pub updated_at: DateTime<Utc>,
    /// Last time the feed was picked for polling. `None` until first polled.
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// New feed for creation.
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub name: String,
    pub url: String,
    pub user_id: i64,
}

impl NewFeed {
    /// Create a new feed request. Name and URL are trimmed.
    pub fn new(name: impl Into<String>, url: impl Into<String>, user_id: i64) -> Self {
        Self {
            name: name.into().trim().to_string(),
            url: url.into().trim().to_string(),
            user_id,
        }
    }
}

/// A feed together with the name of the user who added it.
#[derive(Debug, Clone)]
pub struct FeedWithOwner {
    pub feed: Feed,
    pub owner_name: String,
}

/// A follow relation between a user and a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Post ID.
    pub id: i64,
    /// When the post was stored.
    pub created_at: DateTime<Utc>,
    /// When the post was last updated.
    pub updated_at: DateTime<Utc>,
    /// Post title.
    pub title: String,
    /// Post URL. Unique across all posts regardless of feed.
    pub url: String,
    /// Post description.
    pub description: Option<String>,
    /// Publication date, when the feed gave a parsable one.
    pub published_at: Option<DateTime<Utc>>,
    /// ID of the feed the post was first seen in.
    pub feed_id: i64,
}

/// New post for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub feed_id: i64,
}

impl NewPost {
    /// Create a new post with only the required fields set.
    pub fn new(feed_id: i64, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: None,
            published_at: None,
            feed_id,
        }
    }

    /// Set the description. Empty descriptions are stored as NULL.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }

    /// Set the publication date.
    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }
}

/// Result of inserting a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The post was stored with the given ID.
    Inserted(i64),
    /// A post with the same URL already exists.
    Duplicate,
}

/// Atom `<atom:link>` element carried by an RSS channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomLink {
    pub href: String,
    pub rel: String,
    pub link_type: String,
}

/// Parsed feed from a fetched document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Channel title.
    pub title: String,
    /// Channel link (the website the feed belongs to).
    pub link: String,
    /// Channel description.
    pub description: String,
    /// Generator, if any.
    pub generator: String,
    /// Language code, if any.
    pub language: String,
    /// Last build date as it appears in the document.
    pub last_build_date: String,
    /// Atom self-link, if the channel declares one.
    pub self_link: Option<AtomLink>,
    /// Items in document order.
    pub items: Vec<ParsedItem>,
}

/// Parsed item from a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    /// Item title.
    pub title: String,
    /// Item link. Used as the post URL.
    pub link: String,
    /// Publication date as it appears in the document.
    pub pub_date: String,
    /// Item GUID.
    pub guid: String,
    /// Item description.
    pub description: String,
}

/// Why an item was not turned into a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The item has no link.
    MissingUrl,
    /// The item has no title.
    MissingTitle,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingUrl => write!(f, "missing url"),
            SkipReason::MissingTitle => write!(f, "missing title"),
        }
    }
}

/// An item skipped during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    /// Position of the item in the feed.
    pub index: usize,
    /// Item title, possibly empty.
    pub title: String,
    pub reason: SkipReason,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Number of newly stored posts.
    pub inserted: usize,
    /// Number of items whose URL was already stored.
    pub duplicates: usize,
    /// Items that could not become posts.
    pub skipped: Vec<SkippedItem>,
}

impl IngestReport {
    /// Total number of items seen.
    pub fn total(&self) -> usize {
        self.inserted + self.duplicates + self.skipped.len()
    }
}
