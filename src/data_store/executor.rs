use std::sync::Arc;

use ahash::AHashMap as HashMap;
use async_trait::async_trait;

use super::committer::Committer;
use super::reader::Reader;
use super::tsr::TsrRecord;
use super::{CommitInfo, PendingWrite, PrepareContext, ReadView};
use crate::clock::{Clock, SystemClock};
use crate::connector::Connector;
use crate::errors::Result;
use crate::item::Version;

/// Connectors reachable by name.
pub type ConnectorMap = Arc<HashMap<String, Arc<dyn Connector>>>;

/// Where the reads and writes of a datastore are carried out.
///
/// Every call names the datastore it targets. An executor may serve many
/// datastores and many concurrent attempts; calls of one attempt arrive in
/// program order.
#[async_trait]
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Checks that `ds` is served and its backend reachable.
    async fn ping(&self, ds: &str) -> Result<()>;

    async fn read(&self, ds: &str, key: &str, start_ts: i64) -> Result<ReadView>;

    async fn prepare(
        &self,
        ds: &str,
        items: Vec<PendingWrite>,
        ctx: &PrepareContext,
    ) -> Result<HashMap<String, Version>>;

    async fn commit(&self, ds: &str, items: Vec<CommitInfo>, t_commit: i64) -> Result<()>;

    async fn abort(&self, ds: &str, keys: Vec<String>, txn_id: &str) -> Result<()>;

    async fn create_tsr(&self, ds: &str, txn_id: &str, record: TsrRecord) -> Result<TsrRecord>;
}

/// Runs everything in process against directly held connectors.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    connectors: ConnectorMap,
    reader: Arc<Reader>,
    committer: Committer,
}

impl LocalExecutor {
    pub fn new<I, S>(connectors: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn Connector>)>,
        S: Into<String>,
    {
        Self::with_clock(connectors, Arc::new(SystemClock))
    }

    pub fn with_clock<I, S>(connectors: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn Connector>)>,
        S: Into<String>,
    {
        let connectors: ConnectorMap = Arc::new(
            connectors
                .into_iter()
                .map(|(name, conn)| (name.into(), conn))
                .collect(),
        );
        let reader = Arc::new(Reader::new(connectors.clone(), clock));
        Self {
            committer: Committer::new(reader.clone()),
            connectors,
            reader,
        }
    }

    /// Bounds the TSR outcome cache to `capacity` entries. Drops whatever
    /// the current cache holds.
    pub fn with_outcome_capacity(self, capacity: usize) -> Self {
        let reader = Arc::new(Reader::with_capacity(
            self.connectors.clone(),
            self.reader.clock().clone(),
            capacity,
        ));
        Self {
            committer: Committer::new(reader.clone()),
            connectors: self.connectors,
            reader,
        }
    }

    pub fn reader(&self) -> &Arc<Reader> {
        &self.reader
    }

    /// Names of the datastores this executor serves, sorted.
    pub fn datastores(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connectors.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn ping(&self, ds: &str) -> Result<()> {
        self.reader.connector(ds)?.connect().await
    }

    async fn read(&self, ds: &str, key: &str, start_ts: i64) -> Result<ReadView> {
        self.reader.read(ds, key, start_ts).await
    }

    async fn prepare(
        &self,
        ds: &str,
        items: Vec<PendingWrite>,
        ctx: &PrepareContext,
    ) -> Result<HashMap<String, Version>> {
        self.committer.prepare(ds, items, ctx).await
    }

    async fn commit(&self, ds: &str, items: Vec<CommitInfo>, t_commit: i64) -> Result<()> {
        self.committer.commit(ds, items, t_commit).await
    }

    async fn abort(&self, ds: &str, keys: Vec<String>, txn_id: &str) -> Result<()> {
        self.committer.abort(ds, keys, txn_id).await
    }

    async fn create_tsr(&self, ds: &str, txn_id: &str, record: TsrRecord) -> Result<TsrRecord> {
        self.committer.create_tsr(ds, txn_id, record).await
    }
}
