use std::sync::Arc;

use ahash::AHashMap as HashMap;
use futures::future::join_all;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::config::TransactionConfig;
use crate::data_store::{Datastore, PrepareContext, TsrRecord};
use crate::errors::{Result, SeshatError};
use crate::serializer::Serializer;
use crate::timesource::{TimeMode, TimeSource};

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Init,
    Started,
    Committed,
    Aborted,
}

/// One transaction attempt over one or more datastores.
///
/// Reads see a snapshot fixed at [`start`](Transaction::start); writes are
/// buffered until [`commit`](Transaction::commit), which makes them visible
/// atomically across every datastore or not at all. Exactly one datastore is
/// the global one: it stores the transaction status record that decides the
/// outcome.
///
/// A transaction is a single attempt. After a conflict, run the whole unit of
/// work again in a new transaction.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use seshat::prelude::*;
///
/// # async fn demo() -> seshat::errors::Result<()> {
/// let conn: Arc<dyn Connector> = Arc::new(MemoryConnector::new());
/// let executor = Arc::new(LocalExecutor::new([("accounts", conn)]));
/// let oracle = Arc::new(CounterTimeSource::new());
///
/// let mut txn = Transaction::new(oracle, TransactionConfig::default());
/// txn.add_datastore(Datastore::new("accounts", executor))?;
/// txn.set_global_datastore("accounts")?;
/// txn.start().await?;
///
/// txn.write("accounts", "alice", &100_i64)?;
/// txn.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Transaction {
    id: String,
    status: TxnStatus,
    start_ts: i64,
    datastores: HashMap<String, Datastore>,
    global: Option<String>,
    oracle: Arc<dyn TimeSource>,
    config: TransactionConfig,
}

impl Transaction {
    pub fn new(oracle: Arc<dyn TimeSource>, config: TransactionConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: TxnStatus::Init,
            start_ts: 0,
            datastores: HashMap::new(),
            global: None,
            oracle,
            config,
        }
    }

    /// Unique id of this attempt; also the key of its status record.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TxnStatus {
        self.status
    }

    /// Snapshot timestamp, zero before `start`.
    pub fn start_timestamp(&self) -> i64 {
        self.start_ts
    }

    /// Registers a participating datastore.
    ///
    /// # Errors
    ///
    /// `SeshatError::Config` if a datastore with the same name is registered,
    /// `SeshatError::InvalidState` after `start`.
    pub fn add_datastore(&mut self, ds: Datastore) -> Result<()> {
        self.require(TxnStatus::Init, "add a datastore")?;
        if self.datastores.contains_key(ds.name()) {
            return Err(SeshatError::Config(format!(
                "datastore {:?} is already registered",
                ds.name()
            )));
        }
        self.datastores.insert(ds.name().to_string(), ds);
        Ok(())
    }

    /// Designates the registered datastore `name` as the holder of the TSR.
    pub fn set_global_datastore(&mut self, name: &str) -> Result<()> {
        self.require(TxnStatus::Init, "set the global datastore")?;
        if !self.datastores.contains_key(name) {
            return Err(SeshatError::Config(format!(
                "global datastore {name:?} is not registered"
            )));
        }
        self.global = Some(name.to_string());
        Ok(())
    }

    /// Takes the snapshot timestamp and opens every datastore.
    ///
    /// # Errors
    ///
    /// * `SeshatError::Config` without datastores or without a global one.
    /// * `SeshatError::OracleUnavailable` if no start timestamp can be had.
    pub async fn start(&mut self) -> Result<()> {
        self.require(TxnStatus::Init, "start")?;
        if self.datastores.is_empty() {
            return Err(SeshatError::Config("no datastore registered".to_string()));
        }
        if self.global.is_none() {
            return Err(SeshatError::Config("no global datastore designated".to_string()));
        }
        self.start_ts = self
            .oracle
            .get_time(TimeMode::Start)
            .await
            .map_err(oracle_error)?;
        for ds in self.datastores.values_mut() {
            ds.start().await?;
        }
        self.status = TxnStatus::Started;
        debug!("txn {} started at {}", self.id, self.start_ts);
        Ok(())
    }

    /// Reads and decodes the value of `key` in datastore `ds`.
    ///
    /// # Errors
    ///
    /// * `SeshatError::KeyNotFound` when nothing is visible at the snapshot.
    /// * `SeshatError::DirtyRead` when a concurrent write is still in flight;
    ///   retrying later, or in a new attempt, may succeed.
    pub async fn read<T: DeserializeOwned>(&mut self, ds: &str, key: &str) -> Result<T> {
        let raw = self.read_raw(ds, key).await?;
        Serializer::deserialize(&self.config.codec, &raw)
    }

    pub async fn read_raw(&mut self, ds: &str, key: &str) -> Result<Vec<u8>> {
        self.require(TxnStatus::Started, "read")?;
        let start_ts = self.start_ts;
        self.datastore(ds)?.read(key, start_ts).await
    }

    /// Buffers `value` for `key`. Nothing is sent before `commit`.
    pub fn write<T: Serialize + ?Sized>(&mut self, ds: &str, key: &str, value: &T) -> Result<()> {
        let raw = Serializer::serialize(&self.config.codec, value)?;
        self.write_raw(ds, key, raw)
    }

    pub fn write_raw(&mut self, ds: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.require(TxnStatus::Started, "write")?;
        self.datastore(ds)?.write(key, value);
        Ok(())
    }

    /// Buffers a tombstone for `key`.
    pub fn delete(&mut self, ds: &str, key: &str) -> Result<()> {
        self.require(TxnStatus::Started, "delete")?;
        self.datastore(ds)?.delete(key);
        Ok(())
    }

    /// Makes every buffered write visible atomically.
    ///
    /// Prepares all writes, takes a commit timestamp, and writes the TSR as
    /// COMMITTED; the transaction is committed once that write lands. The
    /// prepared records are then flipped to COMMITTED on a best-effort basis.
    ///
    /// # Errors
    ///
    /// * `SeshatError::PrepareConflict` if any key was changed concurrently;
    ///   the attempt is aborted and may be retried as a new transaction.
    /// * `SeshatError::OracleUnavailable` if no commit timestamp can be had.
    /// * Connector or network errors from the prepare phase.
    pub async fn commit(&mut self) -> Result<()> {
        self.require(TxnStatus::Started, "commit")?;
        if !self.datastores.values().any(Datastore::has_writes) {
            self.status = TxnStatus::Committed;
            debug!("txn {} committed read-only", self.id);
            return Ok(());
        }

        if let Err(e) = self.prepare_all().await {
            debug!("txn {} prepare failed: {e}", self.id);
            return Err(self.fail(e).await);
        }

        let issued = self.oracle.get_time(TimeMode::Commit).await;
        let t_commit = match issued {
            Ok(t) if t >= self.start_ts => t,
            Ok(t) => {
                let e = SeshatError::OracleUnavailable(format!(
                    "commit timestamp {t} precedes start timestamp {}",
                    self.start_ts
                ));
                return Err(self.fail(e).await);
            }
            Err(e) => return Err(self.fail(oracle_error(e)).await),
        };

        let written = self
            .global_datastore()?
            .create_tsr(&self.id, TsrRecord::committed(t_commit))
            .await;
        match written {
            Ok(record) if record.is_committed() => {}
            Ok(_) => {
                let e = SeshatError::PrepareConflict {
                    reason: format!("transaction {} was aborted by a concurrent reader", self.id),
                };
                return Err(self.fail(e).await);
            }
            Err(e) => {
                // The write may have landed anyway; arbitration in `fail`
                // tells which.
                warn!("txn {} tsr write failed: {e}", self.id);
                let e = self.fail(e).await;
                if self.status != TxnStatus::Committed {
                    return Err(e);
                }
            }
        }
        self.status = TxnStatus::Committed;
        debug!("txn {} committed at {t_commit}", self.id);

        join_all(self.datastores.values_mut().map(|ds| ds.commit(t_commit))).await;
        Ok(())
    }

    /// Abandons the attempt.
    ///
    /// Aborting an aborted transaction does nothing.
    pub async fn abort(&mut self) -> Result<()> {
        match self.status {
            TxnStatus::Aborted => Ok(()),
            TxnStatus::Started => {
                self.abort_attempt().await?;
                Ok(())
            }
            _ => Err(self.invalid("abort")),
        }
    }

    async fn prepare_all(&mut self) -> Result<()> {
        let ctx = PrepareContext {
            txn_id: self.id.clone(),
            tsr_store: self.global.clone().unwrap_or_default(),
            group_key_list: self.group_key_list(),
            start_ts: self.start_ts,
            record: self.config.record,
        };
        let writers = self.datastores.values_mut().filter(|ds| ds.has_writes());
        if self.config.concurrent_prepare {
            join_all(writers.map(|ds| ds.prepare(&ctx)))
                .await
                .into_iter()
                .collect::<Result<Vec<()>>>()?;
        } else {
            for ds in writers {
                ds.prepare(&ctx).await?;
            }
        }
        Ok(())
    }

    /// Aborts after a failed commit step and turns the cause into the error
    /// `commit` reports. If arbitration reveals the TSR already says
    /// COMMITTED, the transaction is committed instead.
    async fn fail(&mut self, cause: SeshatError) -> SeshatError {
        match self.abort_attempt().await {
            Ok(true) => {
                self.status = TxnStatus::Committed;
                cause
            }
            Ok(false) | Err(_) if cause.is_conflict() => SeshatError::PrepareConflict {
                reason: cause.to_string(),
            },
            _ => cause,
        }
    }

    /// Records ABORTED (when peers may have seen a PREPARED record) and rolls
    /// back. Returns `true` if the TSR turned out to say COMMITTED, in which
    /// case nothing is rolled back.
    async fn abort_attempt(&mut self) -> Result<bool> {
        let prepared = self.datastores.values().any(Datastore::prepare_attempted);
        if prepared {
            let written = self
                .global_datastore()?
                .create_tsr(&self.id, TsrRecord::aborted())
                .await;
            let record = match written {
                Ok(record) => record,
                Err(e) => {
                    // Without a recorded outcome, rolling back could undo a
                    // commit. Leave the records to lease expiry.
                    warn!("txn {} could not record abort: {e}", self.id);
                    self.status = TxnStatus::Aborted;
                    return Err(e);
                }
            };
            if record.is_committed() {
                return Ok(true);
            }
            let id = self.id.clone();
            join_all(self.datastores.values_mut().map(|ds| ds.abort(&id))).await;
        } else {
            for ds in self.datastores.values_mut() {
                ds.abort(&self.id).await;
            }
        }
        self.status = TxnStatus::Aborted;
        debug!("txn {} aborted", self.id);
        Ok(false)
    }

    fn group_key_list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .datastores
            .values()
            .flat_map(|ds| {
                ds.write_keys()
                    .into_iter()
                    .map(move |key| format!("{}:{key}", ds.name()))
            })
            .collect();
        keys.sort();
        keys
    }

    fn datastore(&mut self, name: &str) -> Result<&mut Datastore> {
        self.datastores
            .get_mut(name)
            .ok_or_else(|| SeshatError::Config(format!("unknown datastore {name:?}")))
    }

    fn global_datastore(&self) -> Result<&Datastore> {
        self.global
            .as_deref()
            .and_then(|name| self.datastores.get(name))
            .ok_or_else(|| SeshatError::Config("no global datastore designated".to_string()))
    }

    fn require(&self, status: TxnStatus, action: &str) -> Result<()> {
        if self.status == status {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &str) -> SeshatError {
        SeshatError::InvalidState(format!(
            "cannot {action} transaction {} in state {:?}",
            self.id, self.status
        ))
    }
}

fn oracle_error(e: SeshatError) -> SeshatError {
    match e {
        SeshatError::OracleUnavailable(_) => e,
        other => SeshatError::OracleUnavailable(other.to_string()),
    }
}
