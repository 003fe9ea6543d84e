use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, warn};
use serde::Deserialize;
use tokio::task::JoinHandle;

use super::{AbortRequest, Ack, CommitRequest, Envelope, PrepareRequest, ReadRequest, TsrRequest};
use crate::data_store::{CacheStats, CommitInfo, Executor, LocalExecutor, ReadView, TsrRecord};
use crate::errors::Result;

/// HTTP front of a [`LocalExecutor`].
///
/// Failures are reported inside the [`Envelope`] with status 200; the HTTP
/// status only reflects transport problems. `/ping` is the exception and
/// answers plain text.
pub struct ExecutorServer;

impl ExecutorServer {
    pub fn router(executor: Arc<LocalExecutor>) -> Router {
        Router::new()
            .route("/ping", get(ping))
            .route("/read", post(read))
            .route("/prepare", post(prepare))
            .route("/commit", post(commit))
            .route("/abort", post(abort))
            .route("/tsr", post(tsr))
            .route("/cache", get(cache_stats).post(clear_cache))
            .with_state(executor)
    }

    pub async fn spawn(
        addr: SocketAddr,
        executor: Arc<LocalExecutor>,
    ) -> Result<(SocketAddr, JoinHandle<()>)> {
        super::spawn_router(addr, Self::router(executor), "executor").await
    }
}

type Shared = State<Arc<LocalExecutor>>;

#[derive(Debug, Deserialize)]
struct PingQuery {
    ds: Option<String>,
}

async fn ping(State(executor): Shared, Query(query): Query<PingQuery>) -> (StatusCode, String) {
    let Some(ds) = query.ds else {
        return (StatusCode::OK, "pong".to_string());
    };
    match executor.ping(&ds).await {
        Ok(()) => (StatusCode::OK, "pong".to_string()),
        Err(e) => {
            warn!("ping of {ds} failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn read(State(executor): Shared, Json(req): Json<ReadRequest>) -> Json<Envelope<ReadView>> {
    debug!("read {}:{} at {}", req.ds_name, req.key, req.start_time);
    Json(Envelope::from_result(
        executor.read(&req.ds_name, &req.key, req.start_time).await,
    ))
}

async fn prepare(
    State(executor): Shared,
    Json(req): Json<PrepareRequest>,
) -> Json<Envelope<Vec<CommitInfo>>> {
    debug!(
        "prepare {} keys on {} for {}",
        req.item_list.len(),
        req.ds_name,
        req.context.txn_id
    );
    let result = executor
        .prepare(&req.ds_name, req.item_list, &req.context)
        .await
        .map(|versions| {
            let mut list: Vec<CommitInfo> = versions
                .into_iter()
                .map(|(key, version)| CommitInfo { key, version })
                .collect();
            list.sort_by(|a, b| a.key.cmp(&b.key));
            list
        });
    Json(Envelope::from_result(result))
}

async fn commit(State(executor): Shared, Json(req): Json<CommitRequest>) -> Json<Envelope<Ack>> {
    let result = executor.commit(&req.ds_name, req.list, req.t_commit).await;
    Json(Envelope::from_result(result.map(|()| Ack {})))
}

async fn abort(State(executor): Shared, Json(req): Json<AbortRequest>) -> Json<Envelope<Ack>> {
    let result = executor.abort(&req.ds_name, req.key_list, &req.txn_id).await;
    Json(Envelope::from_result(result.map(|()| Ack {})))
}

async fn tsr(State(executor): Shared, Json(req): Json<TsrRequest>) -> Json<Envelope<TsrRecord>> {
    Json(Envelope::from_result(
        executor
            .create_tsr(&req.ds_name, &req.txn_id, req.record)
            .await,
    ))
}

async fn cache_stats(State(executor): Shared) -> Json<Envelope<CacheStats>> {
    let stats = executor.reader().cache_stats();
    debug!("cache stats: {stats}");
    Json(Envelope::ok(stats))
}

async fn clear_cache(State(executor): Shared) -> Json<Envelope<Ack>> {
    executor.reader().clear_cache();
    Json(Envelope::ok(Ack {}))
}
