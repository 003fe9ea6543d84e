//! Snapshot reads, prepare/commit/abort, and the per-attempt buffers.
//!
//! The [`Reader`] and [`Committer`] do the work against connectors and are
//! shared by every attempt running in a process. A [`Datastore`] is the
//! buffer one attempt keeps for one participating store; it reaches the
//! reader and committer through an [`Executor`], either in process
//! ([`LocalExecutor`]) or over the network.

mod committer;
mod datastore;
mod executor;
mod reader;
pub mod tsr;
mod txn_buffer;

pub use committer::Committer;
pub use datastore::Datastore;
pub use executor::{ConnectorMap, Executor, LocalExecutor};
pub use reader::{CacheStats, DEFAULT_OUTCOME_CAPACITY, Reader};
pub use tsr::TsrRecord;
pub use txn_buffer::{BufferedWrite, TxnBuffer};

use serde::{Deserialize, Serialize};

use crate::config::RecordConfig;
use crate::item::{ItemSnapshot, Version};

/// The version of a key visible at some snapshot, plus the older history
/// behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadView {
    pub snapshot: ItemSnapshot,
    pub history: Vec<ItemSnapshot>,
}

impl ReadView {
    /// CAS token a later write of this key must present.
    pub fn version(&self) -> Version {
        self.snapshot.version
    }

    pub fn is_deleted(&self) -> bool {
        self.snapshot.is_deleted
    }
}

/// One buffered write handed to the prepare phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PendingWrite {
    pub key: String,
    pub value: Vec<u8>,
    pub is_deleted: bool,
    /// What this attempt read for the key, if it read it.
    pub base: Option<ReadView>,
}

/// Attempt-wide parameters of a prepare call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrepareContext {
    pub txn_id: String,
    /// Datastore holding this attempt's TSR.
    pub tsr_store: String,
    pub group_key_list: Vec<String>,
    pub start_ts: i64,
    pub record: RecordConfig,
}

/// A prepared record to flip to COMMITTED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommitInfo {
    pub key: String,
    pub version: Version,
}
