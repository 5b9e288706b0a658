//! Test helpers for integration tests.
//!
//! Provides a local HTTP server serving fixture feeds and helpers for
//! setting up a database with users and feeds.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use gator::config::FetcherConfig;
use gator::feed::{Feed, FeedService};
use gator::{Database, FeedFetcher};

/// Default timeout for test fetches.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Size limit used by [`small_fetcher`].
pub const SMALL_FEED_LIMIT: u64 = 1024;

const RSS_TYPE: &str = "application/rss+xml; charset=utf-8";
const XML_TYPE: &str = "application/xml";
const HTML_TYPE: &str = "text/html; charset=utf-8";

pub const RSS_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Fixture Blog</title>
    <link>https://fixture.example/</link>
    <description>Posts &amp;amp; notes</description>
    <atom:link href="https://fixture.example/rss.xml" rel="self" type="application/rss+xml" />
    <item>
      <title>Hello</title>
      <link>https://x/a</link>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
      <guid>https://x/a</guid>
      <description>First post</description>
    </item>
    <item>
      <title>Second &amp;amp; last</title>
      <link>https://x/b</link>
      <pubDate>Tue, 03 Jan 2006 10:00:00 GMT</pubDate>
      <guid>https://x/b</guid>
      <description></description>
    </item>
  </channel>
</rss>"#;

/// Shares `https://x/a` with [`RSS_FEED`].
pub const OTHER_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Other Blog</title>
    <link>https://other.example/</link>
    <description>Reposts</description>
    <item>
      <title>Hello (repost)</title>
      <link>https://x/a</link>
    </item>
    <item>
      <title>Original</title>
      <link>https://x/c</link>
    </item>
  </channel>
</rss>"#;

pub const BAD_DATE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Sloppy Blog</title>
    <link>https://sloppy.example/</link>
    <description>Dates are hard</description>
    <item>
      <title>Whenever</title>
      <link>https://x/whenever</link>
      <pubDate>the day before yesterday</pubDate>
    </item>
  </channel>
</rss>"#;

pub const ATOM_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Fixture</title>
  <link href="https://atom.example/" />
  <id>urn:uuid:4a1bd5a6-9d4e-4a63-a6a2-0d5e8a3c7f11</id>
  <updated>2024-05-01T12:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <link href="https://x/atom-1" />
    <id>urn:uuid:0b0e4c8e-6b3c-4d7d-9f5d-8d1f4e2b9a10</id>
    <published>2024-05-01T10:00:00Z</published>
    <updated>2024-05-01T12:00:00Z</updated>
    <summary>From an Atom feed</summary>
  </entry>
</feed>"#;

/// Local HTTP server serving fixture feeds.
///
/// Routes:
/// - `/rss.xml`, `/other.xml`, `/bad-date.xml`, `/atom.xml`: valid feeds
/// - `/headers.xml`: feed whose title is the Accept header and whose
///   description is the User-Agent
/// - `/error.xml`: HTTP 500 with an XML content type
/// - `/missing`: HTTP 404 page served as HTML
/// - `/page.html`: HTML page with status 200
/// - `/garbage.xml`: XML content type, body is not a feed
/// - `/large.xml`: body larger than [`SMALL_FEED_LIMIT`]
/// - `/chunked-large.xml`: same, streamed without a Content-Length
/// - `/chunked.xml`: [`RSS_FEED`] streamed without a Content-Length
/// - `/slow.xml`: answers after ten seconds
pub struct FeedServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FeedServer {
    /// Start the server on an ephemeral port.
    pub async fn start() -> Self {
        let router = Router::new()
            .route("/rss.xml", get(|| async { ([(header::CONTENT_TYPE, RSS_TYPE)], RSS_FEED) }))
            .route("/other.xml", get(|| async { ([(header::CONTENT_TYPE, RSS_TYPE)], OTHER_FEED) }))
            .route(
                "/bad-date.xml",
                get(|| async { ([(header::CONTENT_TYPE, RSS_TYPE)], BAD_DATE_FEED) }),
            )
            .route(
                "/atom.xml",
                get(|| async { ([(header::CONTENT_TYPE, "application/atom+xml")], ATOM_FEED) }),
            )
            .route(
                "/headers.xml",
                get(|headers: HeaderMap| async move {
                    let value = |name: header::HeaderName| {
                        headers
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string()
                    };
                    let body = format!(
                        r#"<rss version="2.0"><channel><title>{}</title><link>https://h.example/</link><description>{}</description></channel></rss>"#,
                        value(header::ACCEPT),
                        value(header::USER_AGENT),
                    );
                    ([(header::CONTENT_TYPE, RSS_TYPE)], body)
                }),
            )
            .route(
                "/error.xml",
                get(|| async {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        [(header::CONTENT_TYPE, XML_TYPE)],
                        "<error/>",
                    )
                }),
            )
            .route(
                "/missing",
                get(|| async {
                    (
                        StatusCode::NOT_FOUND,
                        [(header::CONTENT_TYPE, HTML_TYPE)],
                        "<h1>Not Found</h1>",
                    )
                }),
            )
            .route(
                "/page.html",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, HTML_TYPE)],
                        "<html><body>Not a feed</body></html>",
                    )
                }),
            )
            .route(
                "/garbage.xml",
                get(|| async { ([(header::CONTENT_TYPE, XML_TYPE)], "<<< this is not a feed >>>") }),
            )
            .route(
                "/large.xml",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, XML_TYPE)],
                        "x".repeat(SMALL_FEED_LIMIT as usize * 4),
                    )
                }),
            )
            .route(
                "/chunked-large.xml",
                get(|| async {
                    let chunks = (0..16).map(|_| Ok::<_, std::io::Error>("x".repeat(512)));
                    (
                        [(header::CONTENT_TYPE, XML_TYPE)],
                        Body::from_stream(futures::stream::iter(chunks)),
                    )
                }),
            )
            .route(
                "/chunked.xml",
                get(|| async {
                    let chunks = RSS_FEED
                        .as_bytes()
                        .chunks(64)
                        .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c)));
                    (
                        [(header::CONTENT_TYPE, RSS_TYPE)],
                        Body::from_stream(futures::stream::iter(chunks)),
                    )
                }),
            )
            .route(
                "/slow.xml",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    ([(header::CONTENT_TYPE, RSS_TYPE)], RSS_FEED)
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown: Some(tx),
        }
    }

    /// Absolute URL of a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for FeedServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Fetcher with default configuration.
pub fn fetcher() -> FeedFetcher {
    FeedFetcher::new(&FetcherConfig::default()).unwrap()
}

/// Fetcher rejecting feeds larger than [`SMALL_FEED_LIMIT`].
pub fn small_fetcher() -> FeedFetcher {
    let config = FetcherConfig {
        max_feed_size_bytes: SMALL_FEED_LIMIT,
        ..FetcherConfig::default()
    };
    FeedFetcher::new(&config).unwrap()
}

/// In-memory database with one registered user.
pub async fn setup_db(user: &str) -> Database {
    let db = Database::open_in_memory().await.unwrap();
    FeedService::new(&db).register_user(user).await.unwrap();
    db
}

/// Add a feed for `user` and return it.
pub async fn add_feed(db: &Database, user: &str, name: &str, url: &str) -> Feed {
    let (feed, _) = FeedService::new(db).add_feed(user, name, url).await.unwrap();
    feed
}
