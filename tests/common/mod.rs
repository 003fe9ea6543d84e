//! Common utilities for Seshat integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;

use seshat::clock::{Clock, ManualClock};
use seshat::config::TransactionConfig;
use seshat::connector::{Connector, ConnectorCapabilities, MemoryConnector};
use seshat::errors::{Result, SeshatError};
use seshat::item::{Version, VersionedItem};
use seshat::timesource::CounterTimeSource;
use seshat::{Seshat, TimeSource};

// --- FaultyConnector ---

/// Wraps a [`MemoryConnector`] and fails selected operations on demand.
#[derive(Debug, Default)]
pub struct FaultyConnector {
    inner: MemoryConnector,
    fail_updates: AtomicBool,
    fail_commits: AtomicBool,
    fail_creates: AtomicBool,
}

impl FaultyConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `conditional_update` fails before touching the store.
    pub fn fail_updates(&self, on: bool) {
        self.fail_updates.store(on, Ordering::SeqCst);
    }

    /// `conditional_commit` fails before touching the store.
    pub fn fail_commits(&self, on: bool) {
        self.fail_commits.store(on, Ordering::SeqCst);
    }

    /// `atomic_create` fails before touching the store.
    pub fn fail_creates(&self, on: bool) {
        self.fail_creates.store(on, Ordering::SeqCst);
    }

    fn injected(op: &'static str) -> SeshatError {
        SeshatError::connector(op, "injected failure")
    }
}

#[async_trait]
impl Connector for FaultyConnector {
    fn capabilities(&self) -> ConnectorCapabilities {
        self.inner.capabilities()
    }

    async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    async fn get(&self, name: &str) -> Result<String> {
        self.inner.get(name).await
    }

    async fn put(&self, name: &str, value: &str) -> Result<()> {
        self.inner.put(name, value).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.inner.delete(name).await
    }

    async fn atomic_create(&self, name: &str, value: &str) -> Result<()> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Self::injected("atomic_create"));
        }
        self.inner.atomic_create(name, value).await
    }

    async fn get_item(&self, key: &str) -> Result<VersionedItem> {
        self.inner.get_item(key).await
    }

    async fn put_item(&self, key: &str, item: VersionedItem) -> Result<Version> {
        self.inner.put_item(key, item).await
    }

    async fn conditional_update(
        &self,
        key: &str,
        item: VersionedItem,
        do_create: bool,
    ) -> Result<Version> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::injected("conditional_update"));
        }
        self.inner.conditional_update(key, item, do_create).await
    }

    async fn conditional_commit(
        &self,
        key: &str,
        version: Version,
        t_commit: i64,
    ) -> Result<Version> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Self::injected("conditional_commit"));
        }
        self.inner.conditional_commit(key, version, t_commit).await
    }
}

// --- Helper Functions ---

/// Stores `value` JSON-encoded as a committed record valid from `t_valid`.
pub async fn seed<T: Serialize + ?Sized>(
    conn: &dyn Connector,
    key: &str,
    value: &T,
    t_valid: i64,
) -> Version {
    let raw = serde_json::to_vec(value).unwrap();
    conn.put_item(key, VersionedItem::committed(key, raw, t_valid))
        .await
        .unwrap()
}

/// Deterministic oracle whose first timestamp is `start + 1`.
pub fn counter_oracle(start: i64) -> Arc<CounterTimeSource> {
    Arc::new(CounterTimeSource::starting_at(start))
}

/// Manual clock starting at an arbitrary fixed instant.
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(1_000_000))
}

/// A Seshat over in-memory datastores named `names`; the first one is global.
pub fn setup_seshat(
    names: &[&str],
    oracle: Arc<dyn TimeSource>,
    clock: Arc<dyn Clock>,
    config: TransactionConfig,
) -> (Seshat, Vec<Arc<MemoryConnector>>) {
    let mut builder = Seshat::builder()
        .global_datastore(names[0])
        .time_source(oracle)
        .clock(clock)
        .config(config);
    let mut connectors = Vec::new();
    for name in names {
        let conn = Arc::new(MemoryConnector::new());
        builder = builder.local_datastore(*name, conn.clone());
        connectors.push(conn);
    }
    (builder.build().unwrap(), connectors)
}

/// Single in-memory datastore `"ds"` with default settings.
pub fn setup_single() -> (Seshat, Arc<MemoryConnector>) {
    let (seshat, mut conns) = setup_seshat(
        &["ds"],
        counter_oracle(100),
        manual_clock(),
        TransactionConfig::default(),
    );
    (seshat, conns.remove(0))
}
