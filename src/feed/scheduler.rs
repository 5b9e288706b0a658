//! Polling scheduler.
//!
//! Each cycle picks the feed polled longest ago, marks it fetched, fetches
//! it and ingests its items. Cycles start on a fixed-interval timer, the
//! first one immediately. A feed-level failure ends the cycle, never the
//! loop; only the shutdown signal stops [`Scheduler::run`].

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::fetcher::{FetchError, FetchFeed};
use super::ingestor::PostIngestor;
use super::store::FeedStore;
use super::types::{Feed, IngestReport};
use crate::clock::Clock;
use crate::config::PollInterval;
use crate::GatorError;

/// Default timeout for a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started yet.
    Idle,
    /// Picking the next feed.
    Selecting,
    /// Waiting on the network.
    Fetching,
    /// Writing posts.
    Ingesting,
    /// Waiting for the next tick.
    Sleeping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Selecting => "selecting",
            SchedulerState::Fetching => "fetching",
            SchedulerState::Ingesting => "ingesting",
            SchedulerState::Sleeping => "sleeping",
        };
        f.write_str(name)
    }
}

/// How a cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// There are no feeds to poll.
    NoFeedsAvailable,
    /// The selected feed could not be fetched or parsed.
    FetchFailed { feed: Feed, error: FetchError },
    /// The selected feed was fetched and its items ingested.
    Ingested { feed: Feed, report: IngestReport },
    /// Storage failed while selecting, marking or ingesting.
    StorageUnavailable(GatorError),
}

/// Create a linked shutdown trigger and listener.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownHandle { sender }, Shutdown { receiver })
}

/// Side of the shutdown channel that requests the stop.
#[derive(Debug)]
pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Ask every listener to stop.
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }
}

/// Side of the shutdown channel that waits for the stop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until shutdown is requested.
    ///
    /// If the handle is dropped without triggering, this never returns.
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Polling scheduler.
pub struct Scheduler<S, F, C> {
    store: S,
    fetcher: F,
    clock: C,
    interval: PollInterval,
    fetch_timeout: Duration,
    state: SchedulerState,
}

impl<S, F, C> Scheduler<S, F, C>
where
    S: FeedStore,
    F: FetchFeed,
    C: Clock,
{
    /// Create a scheduler polling one feed every `interval`.
    pub fn new(store: S, fetcher: F, clock: C, interval: PollInterval) -> Self {
        Self {
            store,
            fetcher,
            clock,
            interval,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            state: SchedulerState::Idle,
        }
    }

    /// Set the per-fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Configured interval between cycles.
    pub fn interval(&self) -> PollInterval {
        self.interval
    }

    /// Run one cycle: select, mark, fetch, ingest.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state = SchedulerState::Selecting;
        let outcome = self.cycle().await;
        self.state = SchedulerState::Sleeping;
        outcome
    }

    async fn cycle(&mut self) -> CycleOutcome {
        let feed = match self.store.next_feed_to_poll().await {
            Ok(Some(feed)) => feed,
            Ok(None) => return CycleOutcome::NoFeedsAvailable,
            Err(e) => return CycleOutcome::StorageUnavailable(e),
        };

        // Marked before the fetch so a failing feed moves to the back of
        // the queue too.
        let now = self.clock.now();
        if let Err(e) = self.store.mark_fetched(feed.id, now).await {
            return CycleOutcome::StorageUnavailable(e);
        }

        self.state = SchedulerState::Fetching;
        debug!(feed_id = feed.id, url = %feed.url, "Fetching feed");
        let parsed = match self.fetcher.fetch(&feed.url, self.fetch_timeout).await {
            Ok(parsed) => parsed,
            Err(error) => return CycleOutcome::FetchFailed { feed, error },
        };

        self.state = SchedulerState::Ingesting;
        match PostIngestor::new(&self.store).ingest(&feed, &parsed).await {
            Ok(report) => CycleOutcome::Ingested { feed, report },
            Err(e) => CycleOutcome::StorageUnavailable(e),
        }
    }

    /// Run cycles until `shutdown` is triggered.
    ///
    /// The first cycle starts immediately. A cycle in flight when shutdown
    /// is requested is abandoned.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!("Collecting feeds every {}", self.interval);

        let mut timer = interval(self.interval.as_duration());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.state = SchedulerState::Sleeping;
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.wait() => break,
            }

            tokio::select! {
                outcome = self.run_cycle() => log_outcome(&outcome),
                _ = shutdown.wait() => break,
            }
        }

        self.state = SchedulerState::Idle;
        info!("Feed scheduler stopped");
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::NoFeedsAvailable => {
            info!("No feeds to fetch");
        }
        CycleOutcome::FetchFailed { feed, error } => {
            warn!(feed_id = feed.id, url = %feed.url, "Failed to fetch feed: {}", error);
        }
        CycleOutcome::Ingested { feed, report } => {
            info!(
                feed_id = feed.id,
                feed = %feed.name,
                items = report.total(),
                inserted = report.inserted,
                duplicates = report.duplicates,
                skipped = report.skipped.len(),
                "Collected feed"
            );
        }
        CycleOutcome::StorageUnavailable(e) => {
            error!("Storage unavailable, skipping cycle: {}", e);
        }
    }
}
