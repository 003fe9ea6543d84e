use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::item::Version;

/// Why a key lookup produced no visible value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotFoundKind {
    /// The backing store has no record under the key.
    InStore,
    /// A record exists, but no version in its history is visible at the snapshot.
    InHistory,
    /// The visible version is a tombstone.
    Deleted,
}

/// Which direction of a codec failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializerOp {
    Serialize,
    Deserialize,
}

#[derive(Error, Debug)]
pub enum SeshatError {
    #[error("Connector error in {op}: {message}")]
    Connector { op: &'static str, message: String },

    #[error("Version mismatch on key {key}: expected {expected}, current {current:?}")]
    VersionMismatch {
        key: String,
        expected: Version,
        current: Option<Version>,
    },

    #[error("Key {key} not found ({kind:?})")]
    KeyNotFound { key: String, kind: NotFoundKind },

    #[error("Key {key} already exists")]
    KeyExists { key: String, existing: String },

    #[error("Dirty read on key {key}: a concurrent write is still in flight")]
    DirtyRead { key: String },

    #[error("Serializer error during {op:?}: {message}")]
    Serializer { op: SerializerOp, message: String },

    #[error("Prepare conflict: {reason}")]
    PrepareConflict { reason: String },

    #[error("Timestamp oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Invalid transaction state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl SeshatError {
    pub fn connector(op: &'static str, message: impl ToString) -> Self {
        SeshatError::Connector {
            op,
            message: message.to_string(),
        }
    }

    pub fn not_found(key: impl Into<String>, kind: NotFoundKind) -> Self {
        SeshatError::KeyNotFound {
            key: key.into(),
            kind,
        }
    }

    /// Conflicts that a caller resolves by retrying with a brand-new attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SeshatError::VersionMismatch { .. }
                | SeshatError::DirtyRead { .. }
                | SeshatError::PrepareConflict { .. }
        )
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, SeshatError::KeyNotFound { .. })
    }

    /// Errors raised by the prepare phase that mean "someone else got there first".
    pub(crate) fn is_conflict(&self) -> bool {
        matches!(
            self,
            SeshatError::VersionMismatch { .. }
                | SeshatError::DirtyRead { .. }
                | SeshatError::KeyExists { .. }
                | SeshatError::PrepareConflict { .. }
        )
    }
}

impl From<serde_json::Error> for SeshatError {
    fn from(err: serde_json::Error) -> Self {
        let op = if err.is_data() || err.is_syntax() || err.is_eof() {
            SerializerOp::Deserialize
        } else {
            SerializerOp::Serialize
        };
        SeshatError::Serializer {
            op,
            message: err.to_string(),
        }
    }
}

impl From<bincode::Error> for SeshatError {
    fn from(err: bincode::Error) -> Self {
        SeshatError::Serializer {
            op: SerializerOp::Deserialize,
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "network")]
impl From<reqwest::Error> for SeshatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SeshatError::Network(format!("request timed out: {err}"))
        } else {
            SeshatError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, SeshatError>;
