//! The versioned record format shared by every connector.

mod history;

pub use history::{HistoryIter, bounded_chain};

use serde::{Deserialize, Serialize};

/// CAS token of a stored record. `0` means "never written".
pub type Version = u64;

/// Lifecycle of one version of a record, and the outcome stored in a TSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxnState {
    Prepared,
    Committed,
    Aborted,
}

/// An immutable copy of an earlier version of a record.
///
/// Snapshots live in the history arena of their head record and are addressed
/// by the version they carried while they were the head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemSnapshot {
    pub version: Version,
    pub value: Vec<u8>,
    pub txn_id: String,
    pub txn_state: TxnState,
    pub t_valid: i64,
    pub is_deleted: bool,
    /// Version of the snapshot preceding this one, if still retained.
    pub prev: Option<Version>,
}

impl ItemSnapshot {
    /// Committed and stamped no later than `start_ts`.
    pub fn is_visible_at(&self, start_ts: i64) -> bool {
        self.txn_state == TxnState::Committed && self.t_valid <= start_ts
    }
}

/// A record as stored in a backing store.
///
/// The head carries the latest version (possibly still PREPARED); older
/// committed versions are kept as [`ItemSnapshot`]s in `history`, linked
/// through `prev`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionedItem {
    pub key: String,
    pub value: Vec<u8>,
    /// Transaction that wrote this version; also the key of its TSR.
    pub txn_id: String,
    /// Name of the datastore holding the TSR of `txn_id`.
    pub tsr_store: String,
    /// Every key written by the same attempt, as `datastore:key`.
    pub group_key_list: Vec<String>,
    pub txn_state: TxnState,
    pub t_valid: i64,
    /// Lease deadline in wall-clock milliseconds; meaningful while PREPARED.
    pub t_lease: i64,
    pub prev: Option<Version>,
    pub history: Vec<ItemSnapshot>,
    pub is_deleted: bool,
    pub version: Version,
}

impl VersionedItem {
    /// A committed record with no history, as written by seeding code.
    pub fn committed(key: impl Into<String>, value: Vec<u8>, t_valid: i64) -> Self {
        Self {
            key: key.into(),
            value,
            txn_id: String::new(),
            tsr_store: String::new(),
            group_key_list: Vec::new(),
            txn_state: TxnState::Committed,
            t_valid,
            t_lease: 0,
            prev: None,
            history: Vec::new(),
            is_deleted: false,
            version: 0,
        }
    }

    /// Links `prev` (and whatever it links to) behind this record.
    pub fn with_prev(mut self, prev: &VersionedItem, capacity: usize) -> Self {
        let base = prev.head_snapshot();
        self.history = prev.chain_from(&base, capacity);
        self.prev = self.history.first().map(|s| s.version);
        self
    }

    pub fn is_prepared(&self) -> bool {
        self.txn_state == TxnState::Prepared
    }

    pub fn is_lease_expired(&self, now_millis: i64) -> bool {
        now_millis > self.t_lease
    }

    /// The head as it would appear in a successor's history.
    pub fn head_snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            version: self.version,
            value: self.value.clone(),
            txn_id: self.txn_id.clone(),
            txn_state: self.txn_state,
            t_valid: self.t_valid,
            is_deleted: self.is_deleted,
            prev: self.prev,
        }
    }

    /// The head of a PREPARED record whose TSR says COMMITTED at `t_commit`.
    pub fn resolved_snapshot(&self, t_commit: i64) -> ItemSnapshot {
        ItemSnapshot {
            txn_state: TxnState::Committed,
            t_valid: t_commit,
            ..self.head_snapshot()
        }
    }

    /// The record with its PREPARED head undone.
    ///
    /// The previous snapshot becomes the head again; a record with no
    /// predecessor becomes a committed tombstone. `version` is left unchanged
    /// so the result can be used as a conditional update against `self`.
    pub fn rolled_back(&self) -> VersionedItem {
        let restored = self.prev.and_then(|v| self.find(v));
        match restored {
            Some(snapshot) => {
                let history = match snapshot.prev.and_then(|v| self.find(v)) {
                    Some(older) => self.chain_from(older, self.history.len()),
                    None => Vec::new(),
                };
                VersionedItem {
                    key: self.key.clone(),
                    value: snapshot.value.clone(),
                    txn_id: snapshot.txn_id.clone(),
                    tsr_store: String::new(),
                    group_key_list: Vec::new(),
                    txn_state: TxnState::Committed,
                    t_valid: snapshot.t_valid,
                    t_lease: 0,
                    prev: history.first().map(|s| s.version),
                    history,
                    is_deleted: snapshot.is_deleted,
                    version: self.version,
                }
            }
            None => VersionedItem {
                is_deleted: true,
                value: Vec::new(),
                txn_state: TxnState::Committed,
                t_valid: 0,
                t_lease: 0,
                group_key_list: Vec::new(),
                prev: None,
                history: Vec::new(),
                ..self.clone()
            },
        }
    }
}
