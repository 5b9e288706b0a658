//! Command line interface for Gator.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::clock::SystemClock;
use crate::config::{Config, PollInterval};
use crate::db::Database;
use crate::feed::{FeedFetcher, FeedService, Scheduler, Shutdown, SqliteFeedStore};
use crate::Result;

/// Gator, an RSS feed aggregator.
#[derive(Debug, Parser)]
#[command(name = "gator")]
#[command(about = "RSS feed aggregator")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a new user
    Register {
        /// User name
        name: String,
    },

    /// List all registered users
    Users,

    /// Delete every user with their feeds, follows and posts
    Reset,

    /// Add a feed and follow it
    #[command(name = "addfeed")]
    AddFeed {
        /// User adding the feed
        user: String,
        /// Display name of the feed
        name: String,
        /// Feed URL
        url: String,
    },

    /// List all feeds
    Feeds,

    /// Follow an existing feed
    Follow {
        user: String,
        /// Feed URL
        url: String,
    },

    /// Stop following a feed
    Unfollow {
        user: String,
        /// Feed URL
        url: String,
    },

    /// List the feeds a user follows
    Following { user: String },

    /// Show the newest posts from followed feeds
    Browse {
        user: String,
        /// Number of posts to show
        limit: Option<i64>,
    },

    /// Poll feeds forever, one feed per interval
    Agg {
        /// Time between polls ("30s", "5m", "1h"); defaults to the configured interval
        interval: Option<String>,
    },
}

/// Execute a command, writing user-facing output to `out`.
///
/// `shutdown` stops the aggregator loop; other commands ignore it.
pub async fn execute<W: Write>(
    command: Command,
    config: &Config,
    db: &Database,
    shutdown: Shutdown,
    out: &mut W,
) -> Result<()> {
    let service = FeedService::new(db);

    match command {
        Command::Register { name } => {
            let user = service.register_user(&name).await?;
            writeln!(out, "User '{}' has been registered!", user.name)?;
            writeln!(out, "  ID        = {}", user.id)?;
            writeln!(out, "  CreatedAt = {}", user.created_at.to_rfc3339())?;
        }
        Command::Users => {
            let users = service.list_users().await?;
            if users.is_empty() {
                writeln!(out, "No users yet.")?;
            }
            for user in users {
                writeln!(out, "* {}", user.name)?;
            }
        }
        Command::Reset => {
            let summary = service.reset().await?;
            writeln!(
                out,
                "Database reset: removed {} users, {} feeds and {} posts",
                summary.users, summary.feeds, summary.posts
            )?;
        }
        Command::AddFeed { user, name, url } => {
            let (feed, _) = service.add_feed(&user, &name, &url).await?;
            writeln!(out, "Feed '{}' added ({})", feed.name, feed.url)?;
            writeln!(out, "{} now follows '{}'", user.trim(), feed.name)?;
        }
        Command::Feeds => {
            let feeds = service.list_feeds().await?;
            if feeds.is_empty() {
                writeln!(out, "No feeds yet.")?;
            }
            for entry in feeds {
                writeln!(
                    out,
                    "* {} ({}) added by {}",
                    entry.feed.name, entry.feed.url, entry.owner_name
                )?;
            }
        }
        Command::Follow { user, url } => {
            let (feed, _) = service.follow(&user, &url).await?;
            writeln!(out, "{} now follows '{}'", user.trim(), feed.name)?;
        }
        Command::Unfollow { user, url } => {
            let feed = service.unfollow(&user, &url).await?;
            writeln!(out, "{} no longer follows '{}'", user.trim(), feed.name)?;
        }
        Command::Following { user } => {
            let feeds = service.following(&user).await?;
            if feeds.is_empty() {
                writeln!(out, "{} does not follow any feeds.", user.trim())?;
            }
            for feed in feeds {
                writeln!(out, "* {}", feed.name)?;
            }
        }
        Command::Browse { user, limit } => {
            let posts = service.browse(&user, limit).await?;
            if posts.is_empty() {
                writeln!(out, "No posts yet.")?;
            }
            for post in posts {
                let published = post
                    .published_at
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "unknown date".to_string());
                writeln!(out, "{} | {}", published, post.title)?;
                writeln!(out, "    {}", post.url)?;
                if let Some(description) = post.description {
                    writeln!(out, "    {}", description)?;
                }
            }
        }
        Command::Agg { interval } => {
            let interval: PollInterval = match interval {
                Some(raw) => raw.parse()?,
                None => config.scheduler.poll_interval()?,
            };
            let fetcher = FeedFetcher::new(&config.fetcher)?;
            let scheduler = Scheduler::new(SqliteFeedStore::new(db), fetcher, SystemClock, interval)
                .with_fetch_timeout(config.scheduler.fetch_timeout());

            writeln!(out, "Collecting feeds every {}", scheduler.interval())?;
            out.flush()?;
            scheduler.run(shutdown).await;
        }
    }

    Ok(())
}
