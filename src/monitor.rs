use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::fetcher::{extract_visible_text, PageFetcher};
use crate::matcher::find_new_matches;
use crate::notify::{NotificationPolicy, Notifier};
use crate::store::MatchStore;

/// Consecutive failures beyond this count trigger one extended wait.
pub const ERROR_STREAK_THRESHOLD: u32 = 5;

/// Capability to suspend between iterations; injected so tests can observe
/// requested delays instead of waiting them out.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Result of one poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Fetch succeeded and nothing new turned up.
    Clean,
    /// New matches were found and the notification went out.
    Notified,
    /// Fetch or notification delivery failed.
    Failed,
}

/// Consecutive-failure backoff: after more than
/// [`ERROR_STREAK_THRESHOLD`] failed iterations in a row, one wait of twice
/// the configured interval is taken and the streak starts over. The
/// doubling is flat, never compounding.
#[derive(Debug)]
pub struct Backoff {
    interval: Duration,
    streak: u32,
}

impl Backoff {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            streak: 0,
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Failed => self.streak += 1,
            Outcome::Clean | Outcome::Notified => self.streak = 0,
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Delay before the next iteration. Handing out the extended delay
    /// restarts the streak, so a persistent outage alternates doubled and
    /// normal waits instead of escalating.
    pub fn next_delay(&mut self) -> Duration {
        if self.streak > ERROR_STREAK_THRESHOLD {
            let delay = self.interval * 2;
            warn!(
                "{} consecutive errors, waiting {} seconds before retrying",
                self.streak,
                delay.as_secs()
            );
            self.streak = 0;
            delay
        } else {
            self.interval
        }
    }
}

/// The monitoring loop: fetch, match, notify, sleep, repeat until shutdown.
pub struct Monitor {
    fetcher: Arc<dyn PageFetcher>,
    sender: Arc<dyn Notifier>,
    sleeper: Arc<dyn Sleeper>,
    policy: NotificationPolicy,
    store: MatchStore,
    terms: Vec<String>,
    backoff: Backoff,
}

impl Monitor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        sender: Arc<dyn Notifier>,
        sleeper: Arc<dyn Sleeper>,
        policy: NotificationPolicy,
        store: MatchStore,
        terms: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            sender,
            sleeper,
            policy,
            store,
            terms,
            backoff: Backoff::new(interval),
        }
    }

    /// Run until the shutdown channel fires. Shutdown is observed at the
    /// sleep suspension point; an iteration in progress always completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("started monitoring loop");

        loop {
            let delay = self.tick().await;

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("shutdown signal received, stopping monitor");
                    break;
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }

    /// One full iteration plus the backoff decision; returns the delay to
    /// sleep before the next iteration.
    pub async fn tick(&mut self) -> Duration {
        let outcome = self.check_once().await;
        self.backoff.record(outcome);
        self.backoff.next_delay()
    }

    /// Fetch the page, scan for new matches, persist and notify. Every
    /// failure is logged and folded into the outcome; nothing propagates.
    pub async fn check_once(&mut self) -> Outcome {
        let html = match self.fetcher.fetch().await {
            Ok(html) => html,
            Err(e) => {
                error!("error fetching page: {e}");
                return Outcome::Failed;
            }
        };

        let text = extract_visible_text(&html);
        let new_matches = find_new_matches(&text, &self.terms, &mut self.store);

        if new_matches.is_empty() {
            print!(".");
            let _ = std::io::stdout().flush();
            return Outcome::Clean;
        }

        // Persist before dispatch: a failed send must not re-notify the
        // same lines on the next iteration.
        self.store.persist();

        println!("\nFound {} new matching line(s)!", new_matches.len());
        info!("found {} new matching lines", new_matches.len());

        if self.policy.notify(&new_matches, self.sender.as_ref()).await {
            Outcome::Notified
        } else {
            Outcome::Failed
        }
    }

    pub fn tracked_matches(&self) -> usize {
        self.store.len()
    }
}
