//! Configuration structs injected at construction time.
//!
//! Nothing in the crate reads process-wide settings. Every component receives
//! its configuration explicitly, and all structs can be loaded from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SeshatError};
use crate::serializer::Codec;

/// Durations travel as integral milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

fn parse<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| SeshatError::Config(e.to_string()))
}

/// Per-record protocol parameters. Sent along with remote read and prepare
/// requests so an executor applies the coordinator's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordConfig {
    /// How long a PREPARED record is protected from peer resolution.
    #[serde(with = "millis")]
    pub lease_time: Duration,
    /// Maximum number of versions kept per key, head included.
    pub max_record_length: usize,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            lease_time: Duration::from_millis(1000),
            max_record_length: 2,
        }
    }
}

impl RecordConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = parse(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects record lengths that leave a prepared head nothing to roll
    /// back to.
    pub fn validate(&self) -> Result<()> {
        if self.max_record_length < 2 {
            return Err(SeshatError::Config(format!(
                "max_record_length must be at least 2, got {}",
                self.max_record_length
            )));
        }
        Ok(())
    }

    /// Number of history snapshots kept behind the head. Never zero: a
    /// prepared head always keeps the version it replaced.
    pub fn history_capacity(&self) -> usize {
        self.max_record_length.saturating_sub(1).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub record: RecordConfig,
    /// Dispatch the prepare phase of different datastores concurrently.
    pub concurrent_prepare: bool,
    /// Encoding of values passed to `read` and `write`.
    pub codec: Codec,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            record: RecordConfig::default(),
            concurrent_prepare: true,
            codec: Codec::Json,
        }
    }
}

impl TransactionConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = parse(raw)?;
        config.record.validate()?;
        Ok(config)
    }

    pub fn with_lease_time(mut self, lease_time: Duration) -> Self {
        self.record.lease_time = lease_time;
        self
    }

    pub fn with_max_record_length(mut self, len: usize) -> Self {
        self.record.max_record_length = len;
        self
    }
}

/// Which time source backs a timestamp oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSourceKind {
    Hybrid,
    Simple,
    Counter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub kind: TimeSourceKind,
    /// Refresh period of the hybrid clock's physical component.
    #[serde(with = "millis")]
    pub physical_tick: Duration,
    /// Decimal width reserved for the hybrid clock's logical counter.
    pub logical_bits: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            kind: TimeSourceKind::Hybrid,
            physical_tick: Duration::from_millis(10),
            logical_bits: 6,
        }
    }
}

impl OracleConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        parse(raw)
    }
}

/// Settings of a backup oracle watching a primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    pub primary_url: String,
    #[serde(with = "millis")]
    pub max_skew: Duration,
    pub failure_threshold: u32,
    #[serde(with = "millis")]
    pub probe_interval: Duration,
    #[serde(with = "millis")]
    pub probe_timeout: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            primary_url: "http://127.0.0.1:8010".to_string(),
            max_skew: Duration::from_millis(50),
            failure_threshold: 3,
            probe_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(500),
        }
    }
}

impl FailoverConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        parse(raw)
    }

    /// The wait between declaring a breach and activating.
    pub fn safety_wait(&self) -> Duration {
        self.max_skew * 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Deadline applied to every remote executor call.
    #[serde(with = "millis")]
    pub request_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
        }
    }
}

impl ExecutorConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        parse(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// An instance without a heartbeat for this long is considered gone.
    #[serde(with = "millis")]
    pub ttl: Duration,
    #[serde(with = "millis")]
    pub heartbeat: Duration,
    #[serde(with = "millis")]
    pub cleanup: Duration,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(6),
            heartbeat: Duration::from_secs(2),
            cleanup: Duration::from_secs(3),
            request_timeout: Duration::from_secs(1),
        }
    }
}

impl DiscoveryConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        parse(raw)
    }
}
