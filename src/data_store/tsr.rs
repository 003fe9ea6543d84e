//! Transaction status records.
//!
//! A TSR holds the final outcome of one transaction, keyed by its id, in the
//! transaction's global datastore. It is written with create-if-absent: the
//! coordinator races to write COMMITTED, a reader that finds a stale PREPARED
//! record races to write ABORTED, and whichever lands first is the outcome.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::connector::Connector;
use crate::errors::{Result, SeshatError};
use crate::item::TxnState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TsrRecord {
    pub state: TxnState,
    /// Commit timestamp; zero for aborted transactions.
    pub t_commit: i64,
}

impl TsrRecord {
    pub fn committed(t_commit: i64) -> Self {
        Self {
            state: TxnState::Committed,
            t_commit,
        }
    }

    pub fn aborted() -> Self {
        Self {
            state: TxnState::Aborted,
            t_commit: 0,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state == TxnState::Committed
    }

    fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Reads the TSR of `txn_id`, `None` when it has not been written.
pub async fn read(conn: &dyn Connector, txn_id: &str) -> Result<Option<TsrRecord>> {
    match conn.get(txn_id).await {
        Ok(raw) => TsrRecord::decode(&raw).map(Some),
        Err(e) if e.is_key_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Tries to create the TSR of `txn_id` and returns the record in effect
/// afterwards: `record` itself, or the one a competitor wrote first.
pub async fn create(conn: &dyn Connector, txn_id: &str, record: TsrRecord) -> Result<TsrRecord> {
    let raw = serde_json::to_string(&record)?;
    match conn.atomic_create(txn_id, &raw).await {
        Ok(()) => {
            debug!("tsr {txn_id}: wrote {:?}", record.state);
            Ok(record)
        }
        Err(SeshatError::KeyExists { existing, .. }) => {
            let current = TsrRecord::decode(&existing)?;
            debug!("tsr {txn_id}: already {:?}", current.state);
            Ok(current)
        }
        Err(e) => Err(e),
    }
}
