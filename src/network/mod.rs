//! Remote execution over HTTP and JSON.
//!
//! An executor process owns the real connections and serves
//! `/read`, `/prepare`, `/commit`, `/abort`, `/tsr`, `/ping` and `/cache`
//! ([`ExecutorServer`]). Coordinators reach it through [`HttpExecutor`], which
//! implements the same [`Executor`](crate::data_store::Executor) trait as the
//! in-process executor. Every JSON response is an [`Envelope`].

mod client;
mod server;

pub use client::HttpExecutor;
pub use server::ExecutorServer;

use std::net::SocketAddr;

use axum::Router;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::data_store::{CommitInfo, PendingWrite, PrepareContext, TsrRecord};
use crate::errors::{NotFoundKind, Result, SerializerOp, SeshatError};
use crate::item::Version;

pub const STATUS_OK: &str = "OK";
pub const STATUS_ERROR: &str = "Error";

/// Response wrapper shared by every JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err_msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_kind: Option<ErrorDetail>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            err_msg: String::new(),
            err_kind: None,
            data: Some(data),
        }
    }

    pub fn error(err: &SeshatError) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            err_msg: err.to_string(),
            err_kind: Some(ErrorDetail::of(err)),
            data: None,
        }
    }

    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::error(&e),
        }
    }

    pub fn into_result(self) -> Result<T> {
        if self.status != STATUS_OK {
            let detail = self.err_kind.unwrap_or(ErrorDetail::Other);
            return Err(detail.into_error(self.err_msg));
        }
        self.data
            .ok_or_else(|| SeshatError::Network("OK response without data".to_string()))
    }
}

/// Payload of responses that carry nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}

/// Error classification that survives the trip over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum ErrorDetail {
    VersionMismatch {
        key: String,
        expected: Version,
        current: Option<Version>,
    },
    KeyNotFound {
        key: String,
        kind: NotFoundKind,
    },
    KeyExists {
        key: String,
        existing: String,
    },
    DirtyRead {
        key: String,
    },
    PrepareConflict {
        reason: String,
    },
    Serializer {
        op: SerializerOp,
    },
    OracleUnavailable,
    Connector,
    Config,
    Other,
}

impl ErrorDetail {
    pub fn of(err: &SeshatError) -> Self {
        match err {
            SeshatError::VersionMismatch {
                key,
                expected,
                current,
            } => ErrorDetail::VersionMismatch {
                key: key.clone(),
                expected: *expected,
                current: *current,
            },
            SeshatError::KeyNotFound { key, kind } => ErrorDetail::KeyNotFound {
                key: key.clone(),
                kind: *kind,
            },
            SeshatError::KeyExists { key, existing } => ErrorDetail::KeyExists {
                key: key.clone(),
                existing: existing.clone(),
            },
            SeshatError::DirtyRead { key } => ErrorDetail::DirtyRead { key: key.clone() },
            SeshatError::PrepareConflict { reason } => ErrorDetail::PrepareConflict {
                reason: reason.clone(),
            },
            SeshatError::Serializer { op, .. } => ErrorDetail::Serializer { op: *op },
            SeshatError::OracleUnavailable(_) => ErrorDetail::OracleUnavailable,
            SeshatError::Connector { .. } => ErrorDetail::Connector,
            SeshatError::Config(_) => ErrorDetail::Config,
            SeshatError::InvalidState(_) | SeshatError::Network(_) => ErrorDetail::Other,
        }
    }

    pub fn into_error(self, message: String) -> SeshatError {
        match self {
            ErrorDetail::VersionMismatch {
                key,
                expected,
                current,
            } => SeshatError::VersionMismatch {
                key,
                expected,
                current,
            },
            ErrorDetail::KeyNotFound { key, kind } => SeshatError::KeyNotFound { key, kind },
            ErrorDetail::KeyExists { key, existing } => SeshatError::KeyExists { key, existing },
            ErrorDetail::DirtyRead { key } => SeshatError::DirtyRead { key },
            ErrorDetail::PrepareConflict { reason } => SeshatError::PrepareConflict { reason },
            ErrorDetail::Serializer { op } => SeshatError::Serializer { op, message },
            ErrorDetail::OracleUnavailable => SeshatError::OracleUnavailable(message),
            ErrorDetail::Connector => SeshatError::Connector {
                op: "remote",
                message,
            },
            ErrorDetail::Config => SeshatError::Config(message),
            ErrorDetail::Other => SeshatError::Network(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadRequest {
    pub ds_name: String,
    pub key: String,
    pub start_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrepareRequest {
    pub ds_name: String,
    pub item_list: Vec<PendingWrite>,
    pub context: PrepareContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommitRequest {
    pub ds_name: String,
    pub list: Vec<CommitInfo>,
    pub t_commit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AbortRequest {
    pub ds_name: String,
    pub key_list: Vec<String>,
    pub txn_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TsrRequest {
    pub ds_name: String,
    pub txn_id: String,
    pub record: TsrRecord,
}

/// Binds `addr` and serves `app` in the background. Returns the bound
/// address, which differs from `addr` when port 0 was requested.
pub(crate) async fn spawn_router(
    addr: SocketAddr,
    app: Router,
    what: &'static str,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SeshatError::Network(format!("bind {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| SeshatError::Network(e.to_string()))?;
    info!("{what} listening on {local}");
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("{what} stopped: {e}");
        }
    });
    Ok((local, handle))
}
