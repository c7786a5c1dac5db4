//! Update cycle controller and the background polling loop.
//!
//! A cycle fetches announcements for a window around `now`, classifies them,
//! replaces the snapshot and appends significant records to the history log.
//! Cycles never overlap: the polling loop and forced updates share one lock.
//!
//! The loop is a two-state machine (`Stopped`/`Running`) driven only through
//! [`Monitor::start`] and [`Monitor::stop`]. The loop task inspects the state
//! between cycles, never during one.

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::announcement::RawAnnouncement;
use crate::classifier::{classify, parse_timestamp};
use crate::config::MonitorConfig;
use crate::services::announcement_source::{AnnouncementSource, ArrivalQuery};
use crate::snapshot::{Snapshot, SnapshotStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    /// `generation` identifies the loop task owning this run.
    Running { generation: u64, interval: Duration },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleResult {
    pub fetched_count: usize,
    /// Announcements dropped because they arrived too long ago.
    pub stale_count: usize,
    pub processed_count: usize,
    pub significant_count: usize,
    pub last_updated: NaiveDateTime,
}

#[derive(Debug, Error)]
pub enum CycleError {
    /// Network, status, timeout or decode failure talking to the source.
    #[error("fetch failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

pub struct Monitor {
    source: Box<dyn AnnouncementSource>,
    store: SnapshotStore,
    config: MonitorConfig,
    cycle_lock: Mutex<()>,
    state: watch::Sender<LoopState>,
    generations: AtomicU64,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Monitor {
    pub fn new(
        source: impl AnnouncementSource + 'static,
        store: SnapshotStore,
        config: MonitorConfig,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Stopped);
        Self {
            source: Box::new(source),
            store,
            config,
            cycle_lock: Mutex::new(()),
            state,
            generations: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), LoopState::Running { .. })
    }

    /// Runs one cycle stamped with the current local time.
    ///
    /// Waits for any cycle already in progress; the timestamp is taken once the
    /// cycle actually begins.
    pub async fn run_cycle(&self) -> Result<CycleResult, CycleError> {
        let _guard = self.cycle_lock.lock().await;
        self.cycle(local_now()).await
    }

    /// Runs one cycle as if the current time were `now`.
    pub async fn run_cycle_at(&self, now: NaiveDateTime) -> Result<CycleResult, CycleError> {
        let _guard = self.cycle_lock.lock().await;
        self.cycle(now).await
    }

    /// Out-of-schedule cycle requested by a caller; serialized with the loop.
    pub async fn force_update(&self) -> Result<CycleResult, CycleError> {
        info!("Forced update requested");
        self.run_cycle().await
    }

    fn is_stale(&self, raw: &RawAnnouncement, now: NaiveDateTime) -> bool {
        raw.time_at_location
            .as_deref()
            .and_then(parse_timestamp)
            .is_some_and(|actual| now - actual > TimeDelta::minutes(self.config.stale_arrival_minutes))
    }

    #[tracing::instrument(skip(self), fields(station = %self.config.location_signature))]
    async fn cycle(&self, now: NaiveDateTime) -> Result<CycleResult, CycleError> {
        let query = ArrivalQuery::around(
            &self.config.location_signature,
            now,
            self.config.hours_back,
            self.config.hours_ahead,
        );

        let raw = match self.source.fetch_announcements(&query).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Fetch failed, keeping previous snapshot");
                return Err(CycleError::Fetch(e));
            }
        };
        let fetched_count = raw.len();

        let (stale, fresh): (Vec<_>, Vec<_>) = raw.into_iter().partition(|a| self.is_stale(a, now));

        let records: Vec<_> = fresh.iter().map(|a| classify(a, now)).collect();
        let snapshot = Snapshot::new(records, Some(now));
        let significant: Vec<_> = snapshot.significant().cloned().collect();
        let summary = snapshot.summary();

        let result = CycleResult {
            fetched_count,
            stale_count: stale.len(),
            processed_count: snapshot.records.len(),
            significant_count: significant.len(),
            last_updated: now,
        };

        // An empty batch still replaces the snapshot.
        self.store
            .replace(snapshot)
            .map_err(CycleError::Persistence)?;
        self.store
            .append_history(&significant)
            .map_err(CycleError::Persistence)?;

        info!(
            fetched = result.fetched_count,
            stale = result.stale_count,
            processed = result.processed_count,
            significant = result.significant_count,
            delayed = summary.delayed_trains,
            early = summary.early_trains,
            canceled = summary.canceled_trains,
            replaced = summary.replaced_trains,
            "Update cycle complete"
        );

        Ok(result)
    }

    /// Starts the polling loop. Returns `false` if it was already running.
    ///
    /// The first cycle runs immediately; later cycles start `interval` after the
    /// previous one started, or right away if it overran.
    pub fn start(self: &Arc<Self>, interval: Duration) -> bool {
        let mut generation = None;
        self.state.send_if_modified(|state| match *state {
            LoopState::Running { .. } => false,
            LoopState::Stopped => {
                let next = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
                *state = LoopState::Running {
                    generation: next,
                    interval,
                };
                generation = Some(next);
                true
            }
        });

        let Some(generation) = generation else {
            return false;
        };

        info!(
            generation,
            interval_secs = interval.as_secs(),
            station = %self.config.location_signature,
            "Starting delay monitoring"
        );
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run_loop(generation, interval).await });
        true
    }

    /// Stops the polling loop after the cycle in progress, if any. Returns
    /// `false` if it was not running.
    pub fn stop(&self) -> bool {
        let stopped = self.state.send_if_modified(|state| match *state {
            LoopState::Running { .. } => {
                *state = LoopState::Stopped;
                true
            }
            LoopState::Stopped => false,
        });
        if stopped {
            info!("Stopping delay monitoring");
        }
        stopped
    }

    fn owns_loop(state: &LoopState, generation: u64) -> bool {
        matches!(state, LoopState::Running { generation: g, .. } if *g == generation)
    }

    /// Runs a cycle for loop `generation`, or returns `None` if that loop was
    /// stopped while waiting for the cycle lock.
    async fn run_owned_cycle(&self, generation: u64) -> Option<Result<CycleResult, CycleError>> {
        let _guard = self.cycle_lock.lock().await;
        let owned = Self::owns_loop(&self.state.borrow(), generation);
        if !owned {
            return None;
        }
        Some(self.cycle(local_now()).await)
    }

    async fn run_loop(self: Arc<Self>, generation: u64, interval: Duration) {
        let mut state_rx = self.state.subscribe();

        loop {
            if !Self::owns_loop(&state_rx.borrow_and_update(), generation) {
                break;
            }

            let started = Instant::now();
            let Some(outcome) = self.run_owned_cycle(generation).await else {
                break;
            };
            let next = match outcome {
                Ok(_) => started + interval,
                // Already logged by the cycle; keep the normal schedule.
                Err(CycleError::Fetch(_)) => started + interval,
                Err(e) => {
                    let backoff = self.config.error_backoff();
                    error!(error = %e, backoff_secs = backoff.as_secs(), "Update cycle failed, backing off");
                    Instant::now() + backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep_until(next) => {}
                _ = state_rx.wait_for(|s| !Self::owns_loop(s, generation)) => {}
            }
        }

        info!(generation, "Delay monitoring loop exited");
    }
}
