//! Feed service for Gator.
//!
//! User-facing feed management: registering users, adding and following
//! feeds, and browsing the posts of followed feeds.

use tracing::info;

use super::fetcher::validate_url;
use super::repository::{FeedFollowRepository, FeedRepository, PostRepository};
use super::store::{FeedStore, SqliteFeedStore};
use super::types::{
    Feed, FeedFollow, FeedWithOwner, NewFeed, Post, DEFAULT_BROWSE_LIMIT, MAX_FEED_NAME_LENGTH,
};
use crate::db::{Database, NewUser, User, UserRepository};
use crate::{GatorError, Result};

/// What [`FeedService::reset`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSummary {
    pub users: u64,
    pub feeds: i64,
    pub posts: i64,
}

/// Service for feed operations.
pub struct FeedService<'a> {
    db: &'a Database,
}

impl<'a> FeedService<'a> {
    /// Create a new FeedService with the given database reference.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a new user.
    pub async fn register_user(&self, name: &str) -> Result<User> {
        let user = UserRepository::new(self.db.pool())
            .create(&NewUser::new(name))
            .await?;
        info!(user_id = user.id, "Registered user {}", user.name);
        Ok(user)
    }

    /// List every registered user, ordered by name.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        UserRepository::new(self.db.pool()).list_all().await
    }

    /// Delete every user together with their feeds, follows and posts.
    ///
    /// Feed and post counts are taken just before the delete.
    pub async fn reset(&self) -> Result<ResetSummary> {
        let feeds = FeedRepository::new(self.db.pool()).count().await?;
        let posts = PostRepository::new(self.db.pool()).count(None).await?;
        let users = UserRepository::new(self.db.pool()).delete_all().await?;

        info!(users, feeds, posts, "Reset database");
        Ok(ResetSummary {
            users,
            feeds,
            posts,
        })
    }

    /// Look up a user by name.
    pub async fn get_user(&self, name: &str) -> Result<User> {
        UserRepository::new(self.db.pool())
            .get_by_name(name)
            .await?
            .ok_or_else(|| GatorError::NotFound(format!("user {:?}", name.trim())))
    }

    /// Add a feed on behalf of a user, who then follows it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The user doesn't exist
    /// - The name is empty or too long
    /// - The URL is not an absolute http(s) URL
    /// - A feed with the same URL already exists
    pub async fn add_feed(&self, user_name: &str, name: &str, url: &str) -> Result<(Feed, FeedFollow)> {
        let user = self.get_user(user_name).await?;
        let new_feed = NewFeed::new(name, url, user.id);

        if new_feed.name.is_empty() {
            return Err(GatorError::Validation("feed name is empty".into()));
        }
        if new_feed.name.chars().count() > MAX_FEED_NAME_LENGTH {
            return Err(GatorError::Validation(format!(
                "feed name is longer than {MAX_FEED_NAME_LENGTH} characters"
            )));
        }
        validate_url(&new_feed.url).map_err(|e| GatorError::Validation(e.to_string()))?;

        let (feed, follow) = FeedRepository::new(self.db.pool())
            .create_followed(&new_feed)
            .await?;

        info!(feed_id = feed.id, url = %feed.url, "User {} added feed {}", user.name, feed.name);
        Ok((feed, follow))
    }

    /// List every feed with the user who added it.
    pub async fn list_feeds(&self) -> Result<Vec<FeedWithOwner>> {
        FeedRepository::new(self.db.pool()).list_with_owner().await
    }

    /// Make a user follow an existing feed.
    pub async fn follow(&self, user_name: &str, url: &str) -> Result<(Feed, FeedFollow)> {
        let user = self.get_user(user_name).await?;
        let feed = self.get_feed_by_url(url).await?;

        let follows = FeedFollowRepository::new(self.db.pool());
        if follows.exists(user.id, feed.id).await? {
            return Err(GatorError::Validation(format!(
                "{} already follows {}",
                user.name, feed.url
            )));
        }
        let follow = follows.create(user.id, feed.id).await?;
        Ok((feed, follow))
    }

    /// Make a user stop following a feed.
    pub async fn unfollow(&self, user_name: &str, url: &str) -> Result<Feed> {
        let user = self.get_user(user_name).await?;
        let feed = self.get_feed_by_url(url).await?;

        let removed = FeedFollowRepository::new(self.db.pool())
            .delete(user.id, feed.id)
            .await?;
        if !removed {
            return Err(GatorError::Validation(format!(
                "{} does not follow {}",
                user.name, feed.url
            )));
        }
        Ok(feed)
    }

    /// Feeds a user follows, ordered by name.
    pub async fn following(&self, user_name: &str) -> Result<Vec<Feed>> {
        let user = self.get_user(user_name).await?;
        SqliteFeedStore::new(self.db)
            .list_feeds_followed_by(user.id)
            .await
    }

    /// Newest posts from the feeds a user follows.
    ///
    /// `limit` defaults to [`DEFAULT_BROWSE_LIMIT`] and must be positive.
    pub async fn browse(&self, user_name: &str, limit: Option<i64>) -> Result<Vec<Post>> {
        let limit = limit.unwrap_or(DEFAULT_BROWSE_LIMIT);
        if limit <= 0 {
            return Err(GatorError::Validation(
                "limit must be greater than zero".into(),
            ));
        }

        let user = self.get_user(user_name).await?;
        PostRepository::new(self.db.pool())
            .list_for_user(user.id, limit)
            .await
    }

    async fn get_feed_by_url(&self, url: &str) -> Result<Feed> {
        FeedRepository::new(self.db.pool())
            .get_by_url(url)
            .await?
            .ok_or_else(|| GatorError::NotFound(format!("feed {:?}", url.trim())))
    }
}
