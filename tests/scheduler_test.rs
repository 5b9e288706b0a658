//! End-to-end polling tests: scheduler, fetcher, ingestor and SQLite store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use common::{add_feed, fetcher, setup_db, FeedServer};
use gator::feed::{
    shutdown_channel, CycleOutcome, FeedRepository, FeedService, FetchError, PostRepository,
    Scheduler, SqliteFeedStore,
};
use gator::{ManualClock, PollInterval};

fn minute() -> PollInterval {
    "1m".parse().unwrap()
}

#[tokio::test]
async fn test_same_items_stored_once_across_cycles() {
    let server = FeedServer::start().await;
    let db = setup_db("reader").await;
    let feed = add_feed(&db, "reader", "Fixture", &server.url("/rss.xml")).await;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mut scheduler = Scheduler::new(SqliteFeedStore::new(&db), fetcher(), clock.clone(), minute());

    match scheduler.run_cycle().await {
        CycleOutcome::Ingested { report, .. } => {
            assert_eq!(report.inserted, 2);
            assert_eq!(report.duplicates, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    clock.advance(chrono::Duration::minutes(1));
    match scheduler.run_cycle().await {
        CycleOutcome::Ingested { feed: polled, report } => {
            assert_eq!(polled.id, feed.id);
            assert_eq!(report.inserted, 0);
            assert_eq!(report.duplicates, 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let posts = PostRepository::new(db.pool());
    assert_eq!(posts.count(None).await.unwrap(), 2);

    let hello = posts.get_by_url("https://x/a").await.unwrap().unwrap();
    assert_eq!(hello.title, "Hello");
    assert_eq!(hello.description.as_deref(), Some("First post"));
    assert_eq!(
        hello.published_at,
        Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap())
    );

    let second = posts.get_by_url("https://x/b").await.unwrap().unwrap();
    assert_eq!(second.title, "Second & last");
    assert_eq!(second.description, None);
}

#[tokio::test]
async fn test_shared_url_stored_once_across_feeds() {
    let server = FeedServer::start().await;
    let db = setup_db("reader").await;
    let first = add_feed(&db, "reader", "Fixture", &server.url("/rss.xml")).await;
    let second = add_feed(&db, "reader", "Other", &server.url("/other.xml")).await;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mut scheduler = Scheduler::new(SqliteFeedStore::new(&db), fetcher(), clock.clone(), minute());

    scheduler.run_cycle().await;
    clock.advance(chrono::Duration::minutes(1));
    match scheduler.run_cycle().await {
        CycleOutcome::Ingested { feed, report } => {
            assert_eq!(feed.id, second.id);
            assert_eq!(report.inserted, 1);
            assert_eq!(report.duplicates, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let posts = PostRepository::new(db.pool());
    assert_eq!(posts.count(None).await.unwrap(), 3);
    let shared = posts.get_by_url("https://x/a").await.unwrap().unwrap();
    assert_eq!(shared.feed_id, first.id);
    assert_eq!(shared.title, "Hello");
}

#[tokio::test]
async fn test_failing_feed_does_not_block_others() {
    let server = FeedServer::start().await;
    let db = setup_db("reader").await;
    let broken = add_feed(&db, "reader", "Broken", &server.url("/error.xml")).await;
    let healthy = add_feed(&db, "reader", "Healthy", &server.url("/rss.xml")).await;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mut scheduler = Scheduler::new(SqliteFeedStore::new(&db), fetcher(), clock.clone(), minute());

    match scheduler.run_cycle().await {
        CycleOutcome::FetchFailed { feed, error } => {
            assert_eq!(feed.id, broken.id);
            assert!(matches!(error, FetchError::HttpStatus(500)));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(PostRepository::new(db.pool()).count(None).await.unwrap(), 0);

    clock.advance(chrono::Duration::minutes(1));
    match scheduler.run_cycle().await {
        CycleOutcome::Ingested { feed, .. } => assert_eq!(feed.id, healthy.id),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // The broken feed comes around again.
    clock.advance(chrono::Duration::minutes(1));
    let outcome = scheduler.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::FetchFailed { .. }));
}

#[tokio::test]
async fn test_unparsable_date_stored_without_date() {
    let server = FeedServer::start().await;
    let db = setup_db("reader").await;
    add_feed(&db, "reader", "Sloppy", &server.url("/bad-date.xml")).await;

    let mut scheduler = Scheduler::new(
        SqliteFeedStore::new(&db),
        fetcher(),
        ManualClock::new(Utc::now()),
        minute(),
    );
    let outcome = scheduler.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Ingested { .. }));

    let post = PostRepository::new(db.pool())
        .get_by_url("https://x/whenever")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.published_at, None);
}

#[tokio::test]
async fn test_never_fetched_feed_goes_first() {
    let server = FeedServer::start().await;
    let db = setup_db("reader").await;
    let a = add_feed(&db, "reader", "A", &server.url("/rss.xml")).await;
    let b = add_feed(&db, "reader", "B", &server.url("/other.xml")).await;

    let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    FeedRepository::new(db.pool())
        .mark_fetched(b.id, t - chrono::Duration::minutes(10))
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(t));
    let mut scheduler = Scheduler::new(SqliteFeedStore::new(&db), fetcher(), clock.clone(), minute());

    let mut order = Vec::new();
    for _ in 0..3 {
        if let CycleOutcome::Ingested { feed, .. } = scheduler.run_cycle().await {
            order.push(feed.id);
        }
        clock.advance(chrono::Duration::minutes(1));
    }
    assert_eq!(order, vec![a.id, b.id, a.id]);

    let a = FeedRepository::new(db.pool()).get_by_id(a.id).await.unwrap().unwrap();
    assert_eq!(a.last_fetched_at, Some(t + chrono::Duration::minutes(2)));
}

#[tokio::test]
async fn test_run_polls_until_shutdown() {
    let server = FeedServer::start().await;
    let db = setup_db("reader").await;
    add_feed(&db, "reader", "Fixture", &server.url("/rss.xml")).await;

    let scheduler = Scheduler::new(
        SqliteFeedStore::new(&db),
        fetcher(),
        gator::SystemClock,
        "50ms".parse().unwrap(),
    )
    .with_fetch_timeout(Duration::from_secs(2));

    let (handle, shutdown) = shutdown_channel();
    let task = tokio::spawn(scheduler.run(shutdown));

    let posts = PostRepository::new(db.pool());
    for _ in 0..200 {
        if posts.count(None).await.unwrap() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(posts.count(None).await.unwrap(), 2);

    handle.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    let browse = FeedService::new(&db).browse("reader", Some(5)).await.unwrap();
    assert_eq!(browse.len(), 2);
    assert_eq!(browse[0].url, "https://x/b");
}
