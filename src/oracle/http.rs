use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::{debug, error};
use tokio::task::JoinHandle;

use super::failover::{HealthProbe, ProbeOutcome};
use super::TimeOracle;
use crate::errors::{Result, SeshatError};
use crate::timesource::{TimeMode, TimeSource};

/// HTTP front of a [`TimeOracle`].
///
/// `GET /timestamp/` and `GET /timestamp/{mode}` answer a plain-text integer,
/// or 503 while the node is inactive. `GET /health` answers 200 with `OK` and
/// the latest issued timestamp on a second line, or 503.
pub struct OracleServer;

impl OracleServer {
    pub fn router(oracle: Arc<TimeOracle>) -> Router {
        Router::new()
            .route("/timestamp/", get(timestamp))
            .route("/timestamp/{mode}", get(timestamp_with_mode))
            .route("/health", get(health))
            .with_state(oracle)
    }

    /// Binds `addr` and serves in the background. Returns the bound address,
    /// which differs from `addr` when port 0 was requested.
    pub async fn spawn(
        addr: SocketAddr,
        oracle: Arc<TimeOracle>,
    ) -> Result<(SocketAddr, JoinHandle<()>)> {
        crate::network::spawn_router(addr, Self::router(oracle), "time oracle").await
    }
}

fn plain(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

async fn issue(oracle: &TimeOracle, mode: TimeMode) -> Response {
    if !oracle.is_active() {
        debug!("timestamp requested while inactive");
        return plain(StatusCode::SERVICE_UNAVAILABLE, "Service not active".to_string());
    }
    match oracle.get_time(mode).await {
        Ok(ts) => plain(StatusCode::OK, ts.to_string()),
        Err(SeshatError::OracleUnavailable(msg)) => plain(StatusCode::SERVICE_UNAVAILABLE, msg),
        Err(e) => {
            error!("failed to issue timestamp: {e}");
            plain(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn timestamp(State(oracle): State<Arc<TimeOracle>>) -> Response {
    issue(&oracle, TimeMode::Commit).await
}

async fn timestamp_with_mode(
    State(oracle): State<Arc<TimeOracle>>,
    Path(mode): Path<String>,
) -> Response {
    let mode = if mode == TimeMode::Start.as_str() {
        TimeMode::Start
    } else {
        TimeMode::Commit
    };
    issue(&oracle, mode).await
}

async fn health(State(oracle): State<Arc<TimeOracle>>) -> Response {
    if !oracle.is_active() {
        return plain(StatusCode::SERVICE_UNAVAILABLE, "Service not active".to_string());
    }
    let body = match oracle.last_issued() {
        Some(ts) => format!("OK\n{ts}"),
        None => "OK".to_string(),
    };
    plain(StatusCode::OK, body)
}

/// Health checks over HTTP against a primary's `/health`.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(primary_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: primary_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> ProbeOutcome {
        let response = match self.client.get(format!("{}/health", self.url)).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("health probe of {} failed: {e}", self.url);
                return ProbeOutcome::failed();
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            return ProbeOutcome::failed();
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("health body of {} unreadable, no floor reported: {e}", self.url);
                return ProbeOutcome::healthy(None);
            }
        };
        let last_issued = body.lines().nth(1).and_then(|l| l.trim().parse().ok());
        if last_issued.is_none() {
            debug!("health of {} carries no floor: {body:?}", self.url);
        }
        ProbeOutcome::healthy(last_issued)
    }
}
