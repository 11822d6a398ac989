//! Connectivity monitoring.
//!
//! Hosts with real online/offline signals feed them straight into
//! [`SyncEngine::set_online`]. The monitor here is the compensating loop
//! for environments without reliable signals: it probes the remote on a
//! fixed interval and nudges a guarded pass while work is pending. That
//! makes it a soft liveness aid, not a correctness requirement — the
//! engine's guard is what prevents overlapping passes.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::remote::RemoteApi;
use crate::sync::SyncEngine;

/// Periodic connectivity re-check loop.
///
/// The caller decides where the loop runs (usually `tokio::spawn` on the
/// concrete engine type) and owns its lifetime.
pub struct ConnectivityMonitor<R: RemoteApi> {
    engine: SyncEngine<R>,
    interval: Duration,
}

impl<R: RemoteApi> ConnectivityMonitor<R> {
    /// Default probe interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    pub const fn new(engine: SyncEngine<R>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub const fn with_default_interval(engine: SyncEngine<R>) -> Self {
        Self::new(engine, Self::DEFAULT_INTERVAL)
    }

    /// Probe forever. Never returns; drop the task to stop the loop.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.check_once().await;
        }
    }

    /// One probe step: observe reachability, feed the transition into the
    /// engine, and retry pending work while online.
    pub async fn check_once(&self) {
        let online = self.engine.probe_remote().await;

        match self.engine.set_online(online).await {
            Ok(Some(report)) if report.ran => {
                tracing::debug!(
                    "Reconnect pass: {} synced, {} failed, {} pending",
                    report.synced,
                    report.failed,
                    report.pending
                );
            }
            Ok(_) => {
                if online && self.engine.status().pending > 0 {
                    if let Err(error) = self.engine.force_sync().await {
                        tracing::warn!("Periodic sync attempt failed: {error}");
                    }
                }
            }
            Err(error) => {
                tracing::warn!("Connectivity-triggered sync failed: {error}");
            }
        }
    }
}
