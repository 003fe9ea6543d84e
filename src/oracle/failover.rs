use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::TimeOracle;
use crate::config::FailoverConfig;

/// Result of one health check against the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub healthy: bool,
    /// Latest timestamp the primary reported having issued.
    pub last_issued: Option<i64>,
}

impl ProbeOutcome {
    pub fn healthy(last_issued: Option<i64>) -> Self {
        Self {
            healthy: true,
            last_issued,
        }
    }

    pub fn failed() -> Self {
        Self {
            healthy: false,
            last_issued: None,
        }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Transport errors and non-200 answers both count as failures.
    async fn probe(&self) -> ProbeOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverPhase {
    /// Counting consecutive failed probes.
    Watching { failures: u32 },
    /// Threshold reached at `since`; waiting out the safety margin.
    Breached { since: Instant },
    Active,
}

/// Decides when a backup oracle may start issuing timestamps.
///
/// Activation needs `failure_threshold` consecutive failed probes, which
/// declares a breach, followed by `2 × max_skew` without a healthy probe.
/// The margin assumes clock drift and pauses on the primary stay below
/// `max_skew`; nothing here can verify that.
#[derive(Debug)]
pub struct FailoverMonitor {
    config: FailoverConfig,
    phase: FailoverPhase,
    floor: Option<i64>,
}

impl FailoverMonitor {
    pub fn new(config: FailoverConfig) -> Self {
        Self {
            config,
            phase: FailoverPhase::Watching { failures: 0 },
            floor: None,
        }
    }

    pub fn phase(&self) -> FailoverPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == FailoverPhase::Active
    }

    /// Highest timestamp the primary was seen to have issued.
    pub fn floor(&self) -> Option<i64> {
        self.floor
    }

    /// Earliest instant at which [`poll`](Self::poll) can activate.
    pub fn activation_deadline(&self) -> Option<Instant> {
        match self.phase {
            FailoverPhase::Breached { since } => Some(since + self.config.safety_wait()),
            _ => None,
        }
    }

    pub fn record_probe(&mut self, outcome: ProbeOutcome, now: Instant) {
        if let Some(ts) = outcome.last_issued {
            self.floor = Some(self.floor.map_or(ts, |f| f.max(ts)));
        }
        self.phase = match (self.phase, outcome.healthy) {
            (FailoverPhase::Active, _) => FailoverPhase::Active,
            (_, true) => FailoverPhase::Watching { failures: 0 },
            (FailoverPhase::Watching { failures }, false) => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    warn!(
                        "primary oracle {} failed {failures} health checks, breach declared",
                        self.config.primary_url
                    );
                    FailoverPhase::Breached { since: now }
                } else {
                    FailoverPhase::Watching { failures }
                }
            }
            (breached @ FailoverPhase::Breached { .. }, false) => breached,
        };
    }

    /// Moves to `Active` once the safety wait has elapsed. Returns `true` on
    /// the transition.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.activation_deadline() {
            Some(deadline) if now >= deadline => {
                self.phase = FailoverPhase::Active;
                true
            }
            _ => false,
        }
    }

    /// Probes the primary until this backup takes over, then activates
    /// `oracle` above every timestamp the primary reported.
    pub fn spawn(
        config: FailoverConfig,
        oracle: Arc<TimeOracle>,
        probe: Arc<dyn HealthProbe>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut monitor = FailoverMonitor::new(config);
            let mut interval = tokio::time::interval(monitor.config.probe_interval);
            loop {
                interval.tick().await;
                let outcome = probe.probe().await;
                monitor.record_probe(outcome, Instant::now());
                if let Some(deadline) = monitor.activation_deadline() {
                    tokio::time::sleep_until(deadline).await;
                    // A last look before taking over.
                    let outcome = probe.probe().await;
                    monitor.record_probe(outcome, Instant::now());
                }
                if monitor.poll(Instant::now()) {
                    info!("taking over from primary {}", monitor.config.primary_url);
                    oracle.activate_above(monitor.floor());
                    break;
                }
            }
        })
    }
}
