use std::sync::Arc;

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use log::trace;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{AbortRequest, Ack, CommitRequest, Envelope, PrepareRequest, ReadRequest, TsrRequest};
use crate::config::ExecutorConfig;
use crate::data_store::{CacheStats, CommitInfo, Executor, PendingWrite, PrepareContext, ReadView, TsrRecord};
use crate::discovery::ServiceDiscovery;
use crate::errors::{Result, SeshatError};
use crate::item::Version;

/// [`Executor`] that forwards every call to the executor process serving the
/// datastore, as resolved through service discovery.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    discovery: Arc<dyn ServiceDiscovery>,
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>, config: &ExecutorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { discovery, client })
    }

    async fn base_url(&self, ds: &str) -> Result<String> {
        let address = self.discovery.get_service(ds).await?;
        Ok(normalize(&address))
    }

    async fn post<Req, Resp>(&self, ds: &str, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url(ds).await?);
        trace!("POST {url}");
        let envelope: Envelope<Resp> = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_result()
    }

    /// TSR cache statistics of the executor serving `ds`.
    pub async fn cache_stats(&self, ds: &str) -> Result<CacheStats> {
        let url = format!("{}/cache", self.base_url(ds).await?);
        let envelope: Envelope<CacheStats> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_result()
    }

    pub async fn clear_cache(&self, ds: &str) -> Result<()> {
        let _: Ack = self.post(ds, "/cache", &()).await?;
        Ok(())
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn ping(&self, ds: &str) -> Result<()> {
        let url = format!("{}/ping", self.base_url(ds).await?);
        let response = self.client.get(&url).query(&[("ds", ds)]).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() && body == "pong" {
            Ok(())
        } else {
            Err(SeshatError::Network(format!("ping {ds}: {status} {body}")))
        }
    }

    async fn read(&self, ds: &str, key: &str, start_ts: i64) -> Result<ReadView> {
        let req = ReadRequest {
            ds_name: ds.to_string(),
            key: key.to_string(),
            start_time: start_ts,
        };
        self.post(ds, "/read", &req).await
    }

    async fn prepare(
        &self,
        ds: &str,
        items: Vec<PendingWrite>,
        ctx: &PrepareContext,
    ) -> Result<HashMap<String, Version>> {
        let req = PrepareRequest {
            ds_name: ds.to_string(),
            item_list: items,
            context: ctx.clone(),
        };
        let list: Vec<CommitInfo> = self.post(ds, "/prepare", &req).await?;
        Ok(list.into_iter().map(|c| (c.key, c.version)).collect())
    }

    async fn commit(&self, ds: &str, items: Vec<CommitInfo>, t_commit: i64) -> Result<()> {
        let req = CommitRequest {
            ds_name: ds.to_string(),
            list: items,
            t_commit,
        };
        let _: Ack = self.post(ds, "/commit", &req).await?;
        Ok(())
    }

    async fn abort(&self, ds: &str, keys: Vec<String>, txn_id: &str) -> Result<()> {
        let req = AbortRequest {
            ds_name: ds.to_string(),
            key_list: keys,
            txn_id: txn_id.to_string(),
        };
        let _: Ack = self.post(ds, "/abort", &req).await?;
        Ok(())
    }

    async fn create_tsr(&self, ds: &str, txn_id: &str, record: TsrRecord) -> Result<TsrRecord> {
        let req = TsrRequest {
            ds_name: ds.to_string(),
            txn_id: txn_id.to_string(),
            record,
        };
        self.post(ds, "/tsr", &req).await
    }
}

fn normalize(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}
