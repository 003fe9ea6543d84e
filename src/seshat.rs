use std::sync::Arc;

use log::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::{OracleConfig, TransactionConfig};
use crate::connector::Connector;
use crate::data_store::{Datastore, Executor, LocalExecutor};
use crate::errors::{Result, SeshatError};
use crate::timesource::{self, TimeSource};
use crate::transaction::Transaction;

/// Seshat Prelude
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::connector::*;
    pub use crate::data_store::*;
    pub use crate::discovery::*;
    pub use crate::errors::*;
    pub use crate::item::*;
    #[cfg(feature = "network")]
    pub use crate::network::{ExecutorServer, HttpExecutor};
    pub use crate::oracle::*;
    pub use crate::serializer::*;
    pub use crate::seshat::*;
    pub use crate::timesource::*;
    pub use crate::transaction::*;
}

/// The main entry point: a fixed set of datastores, a time source and a
/// configuration from which transactions are created.
///
/// ```no_run
/// use std::sync::Arc;
/// use seshat::prelude::*;
///
/// # async fn demo() -> seshat::errors::Result<()> {
/// let seshat = Seshat::builder()
///     .local_datastore("users", Arc::new(MemoryConnector::new()))
///     .local_datastore("orders", Arc::new(MemoryConnector::new()))
///     .global_datastore("users")
///     .time_source(Arc::new(CounterTimeSource::new()))
///     .build()?;
///
/// let mut txn = seshat.begin().await?;
/// txn.write("users", "alice", "premium")?;
/// txn.write("orders", "o-1", &42_u32)?;
/// txn.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Seshat {
    datastores: Vec<(String, Arc<dyn Executor>)>,
    global: String,
    oracle: Arc<dyn TimeSource>,
    config: TransactionConfig,
    local: Option<Arc<LocalExecutor>>,
}

impl Seshat {
    pub fn builder() -> SeshatBuilder {
        SeshatBuilder::default()
    }

    /// A fresh transaction in state Init with every datastore registered.
    pub fn new_transaction(&self) -> Result<Transaction> {
        let mut txn = Transaction::new(self.oracle.clone(), self.config.clone());
        for (name, executor) in &self.datastores {
            txn.add_datastore(Datastore::new(name.clone(), executor.clone()))?;
        }
        txn.set_global_datastore(&self.global)?;
        Ok(txn)
    }

    /// A started transaction.
    pub async fn begin(&self) -> Result<Transaction> {
        let mut txn = self.new_transaction()?;
        txn.start().await?;
        Ok(txn)
    }

    /// The in-process executor serving the local datastores, if any.
    pub fn local_executor(&self) -> Option<&Arc<LocalExecutor>> {
        self.local.as_ref()
    }

    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.oracle
    }

    pub fn global_datastore(&self) -> &str {
        &self.global
    }
}

#[derive(Debug, Default)]
pub struct SeshatBuilder {
    local: Vec<(String, Arc<dyn Connector>)>,
    remote: Vec<(String, Arc<dyn Executor>)>,
    global: Option<String>,
    oracle: Option<Arc<dyn TimeSource>>,
    clock: Option<Arc<dyn Clock>>,
    config: TransactionConfig,
}

impl SeshatBuilder {
    /// A datastore accessed in process through `connector`.
    pub fn local_datastore(mut self, name: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        self.local.push((name.into(), connector));
        self
    }

    /// A datastore served by another executor, typically an
    /// [`HttpExecutor`](crate::network::HttpExecutor).
    pub fn remote_datastore(mut self, name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.remote.push((name.into(), executor));
        self
    }

    pub fn global_datastore(mut self, name: impl Into<String>) -> Self {
        self.global = Some(name.into());
        self
    }

    /// Defaults to a hybrid clock built from [`OracleConfig::default`].
    pub fn time_source(mut self, oracle: Arc<dyn TimeSource>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Clock used for leases by the local datastores.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: TransactionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Seshat> {
        let mut names: Vec<&str> = self
            .local
            .iter()
            .map(|(n, _)| n.as_str())
            .chain(self.remote.iter().map(|(n, _)| n.as_str()))
            .collect();
        if names.is_empty() {
            return Err(SeshatError::Config("no datastore registered".to_string()));
        }
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(SeshatError::Config(format!(
                "datastore {:?} is already registered",
                dup[0]
            )));
        }
        let global = self
            .global
            .ok_or_else(|| SeshatError::Config("no global datastore designated".to_string()))?;
        if !names.contains(&global.as_str()) {
            return Err(SeshatError::Config(format!(
                "global datastore {global:?} is not registered"
            )));
        }

        self.config.record.validate()?;

        let local = if self.local.is_empty() {
            None
        } else {
            let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
            Some(Arc::new(LocalExecutor::with_clock(self.local.clone(), clock)))
        };

        let mut datastores: Vec<(String, Arc<dyn Executor>)> = Vec::new();
        if let Some(executor) = &local {
            for (name, _) in &self.local {
                datastores.push((name.clone(), executor.clone() as Arc<dyn Executor>));
            }
        }
        datastores.extend(self.remote);

        let oracle = match self.oracle {
            Some(oracle) => oracle,
            None => timesource::from_config(&OracleConfig::default())?,
        };
        debug!(
            "seshat ready with {} datastores, global {global:?}",
            datastores.len()
        );
        Ok(Seshat {
            datastores,
            global,
            oracle,
            config: self.config,
            local,
        })
    }
}
