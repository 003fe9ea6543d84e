//! Timestamp sources.
//!
//! A [`TimeSource`] hands out the logical timestamps that order transactions:
//! start timestamps bound what an attempt may see, commit timestamps become
//! the `t_valid` of the versions it writes.

mod counter;
#[cfg(feature = "network")]
mod global;
mod hybrid;
mod simple;

pub use counter::CounterTimeSource;
#[cfg(feature = "network")]
pub use global::GlobalTimeSource;
pub use hybrid::HybridTimeSource;
pub use simple::SimpleTimeSource;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{OracleConfig, TimeSourceKind};
use crate::errors::Result;

/// What a timestamp is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    Start,
    Commit,
}

impl TimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeMode::Start => "start",
            TimeMode::Commit => "commit",
        }
    }
}

/// Source of strictly increasing timestamps.
#[async_trait]
pub trait TimeSource: Send + Sync + std::fmt::Debug {
    async fn get_time(&self, mode: TimeMode) -> Result<i64>;

    /// Guarantees every later timestamp is greater than `floor`.
    fn observe(&self, _floor: i64) {}

    /// The most recent timestamp handed out, if any.
    fn last_issued(&self) -> Option<i64> {
        None
    }
}

/// Builds the local source described by `config`.
///
/// The hybrid source's physical tick runs on the ambient tokio runtime when
/// there is one; without it the clock still refreshes whenever its logical
/// counter nears exhaustion.
///
/// # Errors
///
/// `SeshatError::Config` when the hybrid layout cannot hold the current time.
pub fn from_config(config: &OracleConfig) -> Result<Arc<dyn TimeSource>> {
    let source: Arc<dyn TimeSource> = match config.kind {
        TimeSourceKind::Hybrid => {
            let source = Arc::new(HybridTimeSource::new(config.logical_bits)?);
            if tokio::runtime::Handle::try_current().is_ok() {
                HybridTimeSource::spawn_ticker(&source, config.physical_tick);
            }
            source
        }
        TimeSourceKind::Simple => Arc::new(SimpleTimeSource::new()),
        TimeSourceKind::Counter => Arc::new(CounterTimeSource::new()),
    };
    Ok(source)
}
