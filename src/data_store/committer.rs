use std::sync::Arc;

use ahash::AHashMap as HashMap;
use futures::future::join_all;
use log::{debug, warn};

use super::reader::Reader;
use super::tsr::{self, TsrRecord};
use super::{CommitInfo, PendingWrite, PrepareContext};
use crate::connector::Connector;
use crate::errors::Result;
use crate::item::{TxnState, Version, VersionedItem, bounded_chain};

/// Prepare, commit and abort of buffered writes against connectors.
#[derive(Debug, Clone)]
pub struct Committer {
    reader: Arc<Reader>,
}

impl Committer {
    pub fn new(reader: Arc<Reader>) -> Self {
        Self { reader }
    }

    /// Writes every item of one datastore as PREPARED.
    ///
    /// Items run concurrently. Each is CAS-ed against the version this attempt
    /// observed; items the attempt never read are read first to find that
    /// version, or created when the key does not exist.
    ///
    /// # Returns
    ///
    /// The new version of every key.
    ///
    /// # Errors
    ///
    /// Fails with the first error of any item, typically
    /// `SeshatError::VersionMismatch`. Items that did get prepared stay
    /// PREPARED; the caller aborts them.
    pub async fn prepare(
        &self,
        ds: &str,
        items: Vec<PendingWrite>,
        ctx: &PrepareContext,
    ) -> Result<HashMap<String, Version>> {
        let conn = self.reader.connector(ds)?.clone();
        let results = join_all(
            items
                .into_iter()
                .map(|write| self.prepare_one(ds, conn.as_ref(), write, ctx)),
        )
        .await;

        let mut versions = HashMap::with_capacity(results.len());
        for result in results {
            let (key, version) = result?;
            versions.insert(key, version);
        }
        Ok(versions)
    }

    async fn prepare_one(
        &self,
        ds: &str,
        conn: &dyn Connector,
        write: PendingWrite,
        ctx: &PrepareContext,
    ) -> Result<(String, Version)> {
        let base = match write.base {
            Some(base) => Some(base),
            None => match self.reader.read(ds, &write.key, ctx.start_ts).await {
                Ok(view) => Some(view),
                Err(e) if e.is_key_not_found() => None,
                Err(e) => return Err(e),
            },
        };

        let mut item = VersionedItem {
            key: write.key.clone(),
            value: write.value,
            txn_id: ctx.txn_id.clone(),
            tsr_store: ctx.tsr_store.clone(),
            group_key_list: ctx.group_key_list.clone(),
            txn_state: TxnState::Prepared,
            t_valid: ctx.start_ts,
            t_lease: self.reader.now_millis() + ctx.record.lease_time.as_millis() as i64,
            prev: None,
            history: Vec::new(),
            is_deleted: write.is_deleted,
            version: 0,
        };
        let do_create = match &base {
            Some(view) => {
                item.version = view.version();
                item.history = bounded_chain(
                    &view.snapshot,
                    &view.history,
                    ctx.record.history_capacity(),
                );
                item.prev = item.history.first().map(|s| s.version);
                false
            }
            None => true,
        };

        let version = conn.conditional_update(&write.key, item, do_create).await?;
        debug!("{ds}: prepared {} at version {version}", write.key);
        Ok((write.key, version))
    }

    /// Flips prepared records to COMMITTED. Best effort: readers resolve any
    /// record left PREPARED through the TSR.
    pub async fn commit(&self, ds: &str, items: Vec<CommitInfo>, t_commit: i64) -> Result<()> {
        let conn = self.reader.connector(ds)?.clone();
        let results = join_all(items.iter().map(|info| {
            let conn = conn.clone();
            async move {
                conn.conditional_commit(&info.key, info.version, t_commit)
                    .await
                    .map_err(|e| (info.key.as_str(), e))
            }
        }))
        .await;
        for (key, e) in results.into_iter().filter_map(|r| r.err()) {
            warn!("{ds}: commit of {key} left to readers: {e}");
        }
        Ok(())
    }

    /// Undoes records of `keys` that are still PREPARED by `txn_id`.
    ///
    /// Only call this once the transaction's TSR says ABORTED.
    pub async fn abort(&self, ds: &str, keys: Vec<String>, txn_id: &str) -> Result<()> {
        let conn = self.reader.connector(ds)?.clone();
        join_all(keys.iter().map(|key| {
            let conn = conn.clone();
            async move {
                let head = match conn.get_item(key).await {
                    Ok(head) => head,
                    Err(e) => {
                        debug!("{ds}: nothing to roll back for {key}: {e}");
                        return;
                    }
                };
                if !head.is_prepared() || head.txn_id != txn_id {
                    return;
                }
                match conn.conditional_update(key, head.rolled_back(), false).await {
                    Ok(version) => debug!("{ds}: rolled back {key} to version {version}"),
                    Err(e) => warn!("{ds}: roll back of {key} skipped: {e}"),
                }
            }
        }))
        .await;
        Ok(())
    }

    /// Creates the TSR of `txn_id` in `ds`, returning the record in effect.
    pub async fn create_tsr(&self, ds: &str, txn_id: &str, record: TsrRecord) -> Result<TsrRecord> {
        let conn = self.reader.connector(ds)?;
        tsr::create(conn.as_ref(), txn_id, record).await
    }
}
