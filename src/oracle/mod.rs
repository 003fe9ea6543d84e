//! Timestamp oracle node with primary/backup failover.
//!
//! Exactly one node should be active at a time. A primary starts active; a
//! backup starts inactive and is promoted by its [`FailoverMonitor`] once the
//! primary has failed enough health checks and a safety wait has elapsed.

mod failover;
#[cfg(feature = "network")]
mod http;

pub use failover::{FailoverMonitor, FailoverPhase, HealthProbe, ProbeOutcome};
#[cfg(feature = "network")]
pub use http::{HttpHealthProbe, OracleServer};

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use parking_lot::RwLock;

use crate::errors::{Result, SeshatError};
use crate::timesource::{TimeMode, TimeSource};

/// A time source gated by an active flag.
#[derive(Debug)]
pub struct TimeOracle {
    source: Arc<dyn TimeSource>,
    active: RwLock<bool>,
}

impl TimeOracle {
    /// A node that answers immediately.
    pub fn primary(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            active: RwLock::new(true),
        }
    }

    /// A node that refuses to answer until activated.
    pub fn backup(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            active: RwLock::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active.read()
    }

    pub fn set_active(&self, active: bool) {
        let mut flag = self.active.write();
        if *flag != active {
            info!("time oracle active state changed: {active}");
        }
        *flag = active;
    }

    /// Raises the floor of the underlying source, then activates.
    pub fn activate_above(&self, floor: Option<i64>) {
        let mut flag = self.active.write();
        if let Some(floor) = floor {
            self.source.observe(floor);
        }
        if !*flag {
            info!("time oracle activated (floor {floor:?})");
        }
        *flag = true;
    }

    pub fn last_issued(&self) -> Option<i64> {
        self.source.last_issued()
    }
}

#[async_trait]
impl TimeSource for TimeOracle {
    async fn get_time(&self, mode: TimeMode) -> Result<i64> {
        if !self.is_active() {
            return Err(SeshatError::OracleUnavailable(
                "Service not active".to_string(),
            ));
        }
        self.source.get_time(mode).await
    }

    fn observe(&self, floor: i64) {
        self.source.observe(floor);
    }

    fn last_issued(&self) -> Option<i64> {
        self.source.last_issued()
    }
}
