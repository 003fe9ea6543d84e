use std::sync::Arc;

use log::{debug, warn};

use super::executor::Executor;
use super::tsr::TsrRecord;
use super::txn_buffer::{BufferedWrite, TxnBuffer};
use super::{CommitInfo, PrepareContext};
use crate::errors::{NotFoundKind, Result, SeshatError};

/// One participating store, as seen by one attempt.
///
/// Holds the attempt's read cache and write buffer for the store and talks to
/// whichever [`Executor`] owns the store's connection.
#[derive(Debug)]
pub struct Datastore {
    name: String,
    executor: Arc<dyn Executor>,
    buffer: TxnBuffer,
    prepared: Vec<CommitInfo>,
    prepare_attempted: bool,
}

impl Datastore {
    pub fn new(name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        Self {
            name: name.into(),
            executor,
            buffer: TxnBuffer::new(),
            prepared: Vec::new(),
            prepare_attempted: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_writes(&self) -> bool {
        self.buffer.has_writes()
    }

    pub fn write_keys(&self) -> Vec<String> {
        self.buffer.write_keys()
    }

    /// Whether any record of this store may be PREPARED by the attempt.
    pub fn prepare_attempted(&self) -> bool {
        self.prepare_attempted
    }

    pub(crate) async fn start(&mut self) -> Result<()> {
        self.buffer.clear();
        self.prepared.clear();
        self.prepare_attempted = false;
        self.executor.ping(&self.name).await
    }

    /// Reads `key` as of `start_ts`: own writes first, then what the attempt
    /// already read, then the store.
    pub(crate) async fn read(&mut self, key: &str, start_ts: i64) -> Result<Vec<u8>> {
        match self.buffer.buffered_write(key) {
            Some(BufferedWrite::Put(value)) => return Ok(value.clone()),
            Some(BufferedWrite::Delete) => {
                return Err(SeshatError::not_found(key, NotFoundKind::Deleted));
            }
            None => {}
        }
        if let Some(view) = self.buffer.cached_read(key) {
            return visible_value(key, view.is_deleted(), &view.snapshot.value);
        }

        let view = self.executor.read(&self.name, key, start_ts).await?;
        let result = visible_value(key, view.is_deleted(), &view.snapshot.value);
        // Tombstones are cached too; a later write must CAS against them.
        self.buffer.cache_read(key, view);
        result
    }

    pub(crate) fn write(&mut self, key: &str, value: Vec<u8>) {
        self.buffer.put(key, value);
    }

    pub(crate) fn delete(&mut self, key: &str) {
        self.buffer.delete(key);
    }

    pub(crate) async fn prepare(&mut self, ctx: &PrepareContext) -> Result<()> {
        let items = self.buffer.pending_writes();
        if items.is_empty() {
            return Ok(());
        }
        self.prepare_attempted = true;
        debug!("{}: preparing {} keys for {}", self.name, items.len(), ctx.txn_id);
        let versions = self.executor.prepare(&self.name, items, ctx).await?;
        let mut prepared: Vec<CommitInfo> = versions
            .into_iter()
            .map(|(key, version)| CommitInfo { key, version })
            .collect();
        prepared.sort_by(|a, b| a.key.cmp(&b.key));
        self.prepared = prepared;
        Ok(())
    }

    /// Best-effort flip of this store's prepared records.
    pub(crate) async fn commit(&mut self, t_commit: i64) {
        let items = std::mem::take(&mut self.prepared);
        if items.is_empty() {
            return;
        }
        if let Err(e) = self.executor.commit(&self.name, items, t_commit).await {
            warn!("{}: commit left to readers: {e}", self.name);
        }
        self.buffer.clear();
    }

    /// Rolls back whatever this attempt may have prepared here.
    pub(crate) async fn abort(&mut self, txn_id: &str) {
        if self.prepare_attempted {
            let keys = self.buffer.write_keys();
            if let Err(e) = self.executor.abort(&self.name, keys, txn_id).await {
                warn!("{}: rollback for {txn_id} failed: {e}", self.name);
            }
        }
        self.prepared.clear();
        self.buffer.clear();
    }

    pub(crate) async fn create_tsr(&self, txn_id: &str, record: TsrRecord) -> Result<TsrRecord> {
        self.executor.create_tsr(&self.name, txn_id, record).await
    }
}

fn visible_value(key: &str, is_deleted: bool, value: &[u8]) -> Result<Vec<u8>> {
    if is_deleted {
        Err(SeshatError::not_found(key, NotFoundKind::Deleted))
    } else {
        Ok(value.to_vec())
    }
}
