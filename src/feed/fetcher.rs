//! Feed fetcher.
//!
//! Performs one bounded HTTP GET per call, validates the response, parses
//! the body as RSS 2.0 (falling back to Atom 1.0) and decodes HTML entities
//! in every text field.

use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::FeedType;
use htmlescape::decode_html;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use rss::Channel;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{AtomLink, ParsedFeed, ParsedItem};
use crate::config::FetcherConfig;
use crate::{GatorError, Result};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Accept header sent with every request.
const ACCEPT_RSS: &str = "application/rss+xml";

/// Longest entity (`&...;`) tried by the lenient decoder.
const MAX_ENTITY_LENGTH: usize = 32;

/// Error returned when a feed cannot be fetched or parsed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL is empty or not an absolute http(s) URL.
    #[error("invalid feed url: {0}")]
    InvalidInput(String),

    /// Transport failure: DNS, connection, timeout or body read.
    #[error("network error: {0}")]
    Network(String),

    /// The response is not an XML document.
    #[error("unexpected content type {0:?}")]
    BadContentType(String),

    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The body exceeds the configured maximum feed size.
    #[error("feed too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    /// The body is not a well-formed feed.
    #[error("failed to parse feed: {0}")]
    Parse(String),
}

/// Fetches and parses a single feed.
#[async_trait]
pub trait FetchFeed: Send + Sync {
    /// Fetch the feed at `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration)
        -> std::result::Result<ParsedFeed, FetchError>;
}

/// HTTP feed fetcher.
///
/// Holds a reusable HTTP client; otherwise stateless.
pub struct FeedFetcher {
    client: Client,
    max_feed_size: u64,
}

impl FeedFetcher {
    /// Create a new fetcher from configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| GatorError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }

    /// Read the body, stopping as soon as it grows past the size limit.
    async fn read_body(
        &self,
        mut response: reqwest::Response,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read response: {e}")))?
        {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_feed_size {
                return Err(FetchError::TooLarge {
                    size: body.len() as u64,
                    max: self.max_feed_size,
                });
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl FetchFeed for FeedFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<ParsedFeed, FetchError> {
        let url = validate_url(url)?;

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, ACCEPT_RSS)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::Network(describe_reqwest_error(&e)))?;

        // Content type is checked before the status.
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_ascii_lowercase().contains("xml") {
            return Err(FetchError::BadContentType(content_type));
        }

        let status = response.status();
        if status.as_u16() >= 300 {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(FetchError::TooLarge {
                    size: content_length,
                    max: self.max_feed_size,
                });
            }
        }

        // The request timeout also covers the body; a timeout here surfaces
        // as a network error.
        let body = self.read_body(response).await?;
        debug!(url = %url, bytes = body.len(), "Fetched feed");

        let feed = parse_feed(&body)?;
        warn_on_missing_fields(url.as_str(), &feed);
        Ok(feed)
    }
}

/// Check that a feed URL is an absolute http(s) URL.
pub fn validate_url(url: &str) -> std::result::Result<url::Url, FetchError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FetchError::InvalidInput("url is empty".to_string()));
    }

    let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidInput(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FetchError::InvalidInput(format!(
            "unsupported URL scheme: {scheme}"
        ))),
    }
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

/// Parse a feed document.
///
/// RSS is tried first. Documents the RSS reader rejects are accepted when
/// they are Atom feeds.
pub fn parse_feed(bytes: &[u8]) -> std::result::Result<ParsedFeed, FetchError> {
    let feed = match Channel::read_from(bytes) {
        Ok(channel) => from_channel(&channel),
        Err(rss_err) => match feed_rs::parser::parse(bytes) {
            Ok(feed) if matches!(feed.feed_type, FeedType::Atom) => from_atom(feed),
            _ => return Err(FetchError::Parse(rss_err.to_string())),
        },
    };
    Ok(unescape_feed(feed))
}

fn from_channel(channel: &Channel) -> ParsedFeed {
    let self_link = channel.atom_ext().and_then(|ext| {
        let links = ext.links();
        links
            .iter()
            .find(|link| link.rel() == "self")
            .or_else(|| links.first())
            .map(|link| AtomLink {
                href: link.href().to_string(),
                rel: link.rel().to_string(),
                link_type: link.mime_type().unwrap_or_default().to_string(),
            })
    });

    let items = channel
        .items()
        .iter()
        .map(|item| ParsedItem {
            title: item.title().unwrap_or_default().to_string(),
            link: item.link().unwrap_or_default().to_string(),
            pub_date: item.pub_date().unwrap_or_default().to_string(),
            guid: item.guid().map(|g| g.value().to_string()).unwrap_or_default(),
            description: item.description().unwrap_or_default().to_string(),
        })
        .collect();

    ParsedFeed {
        title: channel.title().to_string(),
        link: channel.link().to_string(),
        description: channel.description().to_string(),
        generator: channel.generator().unwrap_or_default().to_string(),
        language: channel.language().unwrap_or_default().to_string(),
        last_build_date: channel.last_build_date().unwrap_or_default().to_string(),
        self_link,
        items,
    }
}

fn from_atom(feed: feed_rs::model::Feed) -> ParsedFeed {
    let self_link = feed
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("self"))
        .map(|link| AtomLink {
            href: link.href.clone(),
            rel: "self".to_string(),
            link_type: link.media_type.clone().unwrap_or_default(),
        });

    let items = feed
        .entries
        .into_iter()
        .map(|entry| ParsedItem {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link: alternate_link(&entry.links),
            pub_date: entry
                .published
                .or(entry.updated)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
            guid: entry.id,
            description: entry
                .summary
                .map(|t| t.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default(),
        })
        .collect();

    ParsedFeed {
        title: feed.title.map(|t| t.content).unwrap_or_default(),
        link: alternate_link(&feed.links),
        description: feed.description.map(|t| t.content).unwrap_or_default(),
        generator: feed.generator.map(|g| g.content).unwrap_or_default(),
        language: feed.language.unwrap_or_default(),
        last_build_date: feed.updated.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
        self_link,
        items,
    }
}

/// First `alternate` (or rel-less) link, else the first link of any kind.
fn alternate_link(links: &[feed_rs::model::Link]) -> String {
    links
        .iter()
        .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|link| link.href.clone())
        .unwrap_or_default()
}

fn unescape_feed(feed: ParsedFeed) -> ParsedFeed {
    ParsedFeed {
        title: unescape_html(&feed.title),
        link: unescape_html(&feed.link),
        description: unescape_html(&feed.description),
        generator: unescape_html(&feed.generator),
        language: unescape_html(&feed.language),
        last_build_date: unescape_html(&feed.last_build_date),
        self_link: feed.self_link.map(|link| AtomLink {
            href: unescape_html(&link.href),
            rel: unescape_html(&link.rel),
            link_type: unescape_html(&link.link_type),
        }),
        items: feed
            .items
            .into_iter()
            .map(|item| ParsedItem {
                title: unescape_html(&item.title),
                link: unescape_html(&item.link),
                pub_date: unescape_html(&item.pub_date),
                guid: unescape_html(&item.guid),
                description: unescape_html(&item.description),
            })
            .collect(),
    }
}

/// Decode HTML entities.
///
/// Malformed or unknown entities are kept as literal text instead of
/// failing the whole string.
pub fn unescape_html(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    match decode_html(s) {
        Ok(decoded) => decoded,
        Err(_) => decode_html_lenient(s),
    }
}

fn decode_html_lenient(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        // Only the next few bytes can close an entity.
        let decoded = tail[1..]
            .bytes()
            .take(MAX_ENTITY_LENGTH + 1)
            .position(|b| b == b';')
            .map(|end| &tail[..end + 2])
            .and_then(|entity| decode_html(entity).ok().map(|d| (entity.len(), d)));

        match decoded {
            Some((len, text)) => {
                out.push_str(&text);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn warn_on_missing_fields(url: &str, feed: &ParsedFeed) {
    if feed.title.is_empty() {
        warn!(url = %url, "Feed has no title");
    }
    if feed.link.is_empty() {
        warn!(url = %url, "Feed has no link");
    }
    if feed.description.is_empty() {
        warn!(url = %url, "Feed has no description");
    }
    if feed.items.is_empty() {
        warn!(url = %url, "Feed has no items");
    }
}
