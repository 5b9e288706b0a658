//! Feed, follow and post repositories for Gator.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::types::{Feed, FeedFollow, FeedWithOwner, InsertOutcome, NewFeed, NewPost, Post};
use crate::datetime::{format_timestamp, parse_timestamp};
use crate::db::{is_unique_violation, DbPool};
use crate::{GatorError, Result};

/// Row type for feed from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    id: i64,
    name: String,
    url: String,
    user_id: i64,
    created_at: String,
    updated_at: String,
    last_fetched_at: Option<String>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            name: row.name,
            url: row.url,
            user_id: row.user_id,
            created_at: parse_timestamp(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
            last_fetched_at: row.last_fetched_at.and_then(|s| parse_timestamp(&s)),
        }
    }
}

/// Row type for feed joined with its owner.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedWithOwnerRow {
    #[sqlx(flatten)]
    feed: FeedRow,
    owner_name: String,
}

impl From<FeedWithOwnerRow> for FeedWithOwner {
    fn from(row: FeedWithOwnerRow) -> Self {
        FeedWithOwner {
            feed: Feed::from(row.feed),
            owner_name: row.owner_name,
        }
    }
}

/// Row type for feed follow from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedFollowRow {
    id: i64,
    user_id: i64,
    feed_id: i64,
    created_at: String,
    updated_at: String,
}

impl From<FeedFollowRow> for FeedFollow {
    fn from(row: FeedFollowRow) -> Self {
        FeedFollow {
            id: row.id,
            user_id: row.user_id,
            feed_id: row.feed_id,
            created_at: parse_timestamp(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for post from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PostRow {
    id: i64,
    created_at: String,
    updated_at: String,
    title: String,
    url: String,
    description: Option<String>,
    published_at: Option<String>,
    feed_id: i64,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            created_at: parse_timestamp(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
            title: row.title,
            url: row.url,
            description: row.description,
            published_at: row.published_at.and_then(|s| parse_timestamp(&s)),
            feed_id: row.feed_id,
        }
    }
}

async fn insert_feed(conn: &mut SqliteConnection, feed: &NewFeed) -> Result<i64> {
    let now = format_timestamp(&Utc::now());

    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO feeds (name, url, user_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&feed.name)
    .bind(&feed.url)
    .bind(feed.user_id)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            GatorError::Validation(format!("feed {} already exists", feed.url))
        } else {
            GatorError::Database(e.to_string())
        }
    })
}

async fn insert_follow(
    conn: &mut SqliteConnection,
    user_id: i64,
    feed_id: i64,
) -> Result<FeedFollowRow> {
    let now = format_timestamp(&Utc::now());

    sqlx::query_as::<_, FeedFollowRow>(
        r#"
        INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, feed_id, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(feed_id)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            GatorError::Validation("feed is already followed".into())
        } else {
            GatorError::Database(e.to_string())
        }
    })
}

/// Repository for feed operations.
pub struct FeedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new feed.
    ///
    /// Fails with a validation error when a feed with the same URL exists.
    pub async fn create(&self, feed: &NewFeed) -> Result<Feed> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;
        let id = insert_feed(&mut *conn, feed).await?;
        drop(conn);

        self.get_by_id(id)
            .await?
            .ok_or_else(|| GatorError::NotFound("feed".into()))
    }

    /// Create a new feed followed by the user who added it.
    ///
    /// Both rows are written in one transaction; if either insert fails
    /// neither is kept.
    pub async fn create_followed(&self, feed: &NewFeed) -> Result<(Feed, FeedFollow)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        let id = insert_feed(&mut *tx, feed).await?;
        let follow = insert_follow(&mut *tx, feed.user_id, id).await?;

        tx.commit()
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        let feed = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| GatorError::NotFound("feed".into()))?;
        Ok((feed, FeedFollow::from(follow)))
    }

    /// Get a feed by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, name, url, user_id, created_at, updated_at, last_fetched_at
            FROM feeds
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// Get a feed by URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, name, url, user_id, created_at, updated_at, last_fetched_at
            FROM feeds
            WHERE url = $1
            "#,
        )
        .bind(url.trim())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// List all feeds with the name of the user who added them.
    pub async fn list_with_owner(&self) -> Result<Vec<FeedWithOwner>> {
        let rows = sqlx::query_as::<_, FeedWithOwnerRow>(
            r#"
            SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at,
                   f.last_fetched_at, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name ASC, f.id ASC
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(FeedWithOwner::from).collect())
    }

    /// List the feeds a user follows, ordered by feed name.
    pub async fn list_followed_by(&self, user_id: i64) -> Result<Vec<Feed>> {
        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at, f.last_fetched_at
            FROM feeds f
            JOIN feed_follows ff ON ff.feed_id = f.id
            WHERE ff.user_id = $1
            ORDER BY f.name ASC, f.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Get the feed that was polled longest ago.
    ///
    /// Never-polled feeds come first; ties go to the lowest ID.
    pub async fn select_oldest_fetched(&self) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, name, url, user_id, created_at, updated_at, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// Record that a feed was polled at `at`.
    ///
    /// Returns `false` when the feed does not exist.
    pub async fn mark_fetched(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let at = format_timestamp(&at);
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET last_fetched_at = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(&at)
        .bind(&at)
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all feeds.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feeds")
            .fetch_one(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;
        Ok(count)
    }
}

/// Repository for feed follow operations.
pub struct FeedFollowRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedFollowRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Make a user follow a feed.
    ///
    /// Fails with a validation error when the user already follows it.
    pub async fn create(&self, user_id: i64, feed_id: i64) -> Result<FeedFollow> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;
        let row = insert_follow(&mut *conn, user_id, feed_id).await?;

        Ok(FeedFollow::from(row))
    }

    /// Remove a follow. Returns `false` when there was none.
    pub async fn delete(&self, user_id: i64, feed_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = $1 AND feed_id = $2")
            .bind(user_id)
            .bind(feed_id)
            .execute(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Check whether a user follows a feed.
    pub async fn exists(&self, user_id: i64, feed_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM feed_follows WHERE user_id = $1 AND feed_id = $2",
        )
        .bind(user_id)
        .bind(feed_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(count > 0)
    }
}

/// Repository for post operations.
pub struct PostRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> PostRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a post.
    ///
    /// A post whose URL is already stored is reported as
    /// [`InsertOutcome::Duplicate`]; the stored row is left untouched.
    pub async fn insert(&self, post: &NewPost) -> Result<InsertOutcome> {
        let now = format_timestamp(&Utc::now());
        let published_at = post.published_at.as_ref().map(format_timestamp);

        let result = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO posts (created_at, updated_at, title, url, description, published_at, feed_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(&published_at)
        .bind(post.feed_id)
        .fetch_one(self.pool)
        .await;

        match result {
            Ok(id) => Ok(InsertOutcome::Inserted(id)),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(GatorError::Database(e.to_string())),
        }
    }

    /// Get a post by URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, created_at, updated_at, title, url, description, published_at, feed_id
            FROM posts
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(Post::from))
    }

    /// List the newest posts from the feeds a user follows.
    ///
    /// Ordered by publication date, newest first; posts without a date
    /// come last.
    pub async fn list_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT p.id, p.created_at, p.updated_at, p.title, p.url, p.description,
                   p.published_at, p.feed_id
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = $1
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// Count posts, optionally restricted to one feed.
    pub async fn count(&self, feed_id: Option<i64>) -> Result<i64> {
        let count: i64 = match feed_id {
            Some(feed_id) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE feed_id = $1")
                .bind(feed_id)
                .fetch_one(self.pool)
                .await,
            None => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
                .fetch_one(self.pool)
                .await,
        }
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(count)
    }
}
