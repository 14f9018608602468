//! Client side of the progress rendezvous.
//!
//! Idle → Requesting → Polling → (Completed | Failed) → Idle. The transition
//! functions are plain methods so the machine can be driven without a server;
//! [`ProgressPoller::run`] adds the fixed-interval loop on top.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{ApiClient, ClientError};
use crate::progress::{ProgressReport, ProgressStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum PollerState {
    Idle,
    Requesting,
    Polling { progress: f64 },
    Completed,
    Failed(String),
}

impl PollerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Consecutive poll failures tolerated before giving up.
    pub max_consecutive_failures: u32,
    /// Consecutive reports without forward progress tolerated before giving
    /// up. Covers downloads that never registered (rejected request) or
    /// stopped reporting.
    pub max_stalled_polls: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_consecutive_failures: 10,
            max_stalled_polls: 60,
        }
    }
}

pub struct ProgressPoller {
    client: ApiClient,
    token: String,
    config: PollerConfig,
    state: PollerState,
    failures: u32,
    stalled: u32,
}

impl ProgressPoller {
    pub fn new(client: ApiClient, token: &str, config: PollerConfig) -> Self {
        Self {
            client,
            token: token.to_string(),
            config,
            state: PollerState::Idle,
            failures: 0,
            stalled: 0,
        }
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    /// The download has been triggered.
    pub fn begin(&mut self) -> &PollerState {
        if self.state == PollerState::Idle {
            self.failures = 0;
            self.stalled = 0;
            self.state = PollerState::Requesting;
        }
        &self.state
    }

    pub fn on_report(&mut self, report: ProgressReport) -> &PollerState {
        if !matches!(self.state, PollerState::Requesting | PollerState::Polling { .. }) {
            return &self.state;
        }
        self.failures = 0;
        if report.status == ProgressStatus::Completed || report.progress >= 100.0 {
            self.state = PollerState::Completed;
            return &self.state;
        }

        let previous = match self.state {
            PollerState::Polling { progress } => progress,
            _ => 0.0,
        };
        if report.progress > previous {
            self.stalled = 0;
        } else {
            self.stalled += 1;
        }

        // The server only forgets an entry it was tracking when the transfer
        // failed or the client went away.
        self.state = if previous > 0.0 && report.progress == 0.0 {
            PollerState::Failed("download is no longer tracked by the server".to_string())
        } else if self.stalled >= self.config.max_stalled_polls {
            PollerState::Failed(format!(
                "no progress after {} polls, the download may not have started",
                self.stalled
            ))
        } else {
            PollerState::Polling {
                progress: report.progress,
            }
        };
        &self.state
    }

    pub fn on_failure(&mut self, err: &ClientError) -> &PollerState {
        if !matches!(self.state, PollerState::Requesting | PollerState::Polling { .. }) {
            return &self.state;
        }
        self.failures += 1;
        warn!(
            "Error polling progress ({}/{}): {}",
            self.failures, self.config.max_consecutive_failures, err
        );
        if self.failures >= self.config.max_consecutive_failures {
            self.state = PollerState::Failed(format!(
                "gave up after {} failed polls: {}",
                self.failures, err
            ));
        }
        &self.state
    }

    /// Back to idle once a run is over.
    pub fn reset(&mut self) {
        self.state = PollerState::Idle;
        self.failures = 0;
        self.stalled = 0;
    }

    /// Polls every interval until the download completes or the poller gives up
    /// (transport failures or no progress, see [`PollerConfig`]).
    ///
    /// `on_update` sees every state change. The terminal state is returned and
    /// the poller is left idle.
    pub async fn run<F>(&mut self, cancel: &CancellationToken, mut on_update: F) -> PollerState
    where
        F: FnMut(&PollerState),
    {
        on_update(self.begin());

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        while !self.state.is_terminal() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.state = PollerState::Failed("cancelled".to_string());
                    on_update(&self.state);
                    break;
                }
                _ = interval.tick() => {}
            }

            let state = match self.client.progress(&self.token).await {
                Ok(report) => {
                    debug!("Progress {:.1}% ({:?})", report.progress, report.status);
                    self.on_report(report)
                }
                Err(e) => self.on_failure(&e),
            };
            on_update(state);
        }

        let finished = self.state.clone();
        self.reset();
        finished
    }
}
