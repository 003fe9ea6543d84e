//! Per-backend atomic primitives.

mod memory;
mod registry;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use memory::MemoryConnector;
pub use registry::{ConnectorConfig, ConnectorFactory, ConnectorRegistry};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksConnector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SeshatError};
use crate::item::{TxnState, Version, VersionedItem};

/// What a backend can guarantee, declared when it registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectorCapabilities {
    /// Conditional operations run as one atomic unit inside the backend.
    pub server_side_cas: bool,
    /// `atomic_create` is supported natively.
    pub atomic_create: bool,
    /// Data survives a process restart.
    pub persistent: bool,
}

/// Trait for the atomic primitives a backing store must provide.
///
/// A connector knows nothing about transactions. It stores
/// [`VersionedItem`]s under keys and plain strings under names (used for
/// transaction status records), and it offers compare-and-swap on the item
/// [`Version`]. Every conditional operation must execute as a single atomic
/// unit against the store; a separate read followed by a write reintroduces
/// the race the CAS exists to prevent.
///
/// Implementations must be `Send` and `Sync`; one connector is shared by all
/// concurrently running attempts.
///
/// # Examples
///
/// ```no_run
/// use seshat::prelude::*;
///
/// # async fn demo() -> seshat::errors::Result<()> {
/// let conn = MemoryConnector::new();
/// let item = VersionedItem::committed("k", b"v".to_vec(), 100);
/// let v1 = conn.conditional_update("k", item.clone(), true).await?;
/// assert_eq!(v1, 1);
/// // A second create loses: the stored version is no longer 0.
/// assert!(conn.conditional_update("k", item, true).await.is_err());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    fn capabilities(&self) -> ConnectorCapabilities;

    /// Establishes the connection. Idempotent.
    async fn connect(&self) -> Result<()>;

    /// Reads a plain value. Fails with `KeyNotFound` when absent.
    async fn get(&self, name: &str) -> Result<String>;

    async fn put(&self, name: &str, value: &str) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// Creates `name` only if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `SeshatError::KeyExists` carrying the stored value when the
    /// name is already taken.
    async fn atomic_create(&self, name: &str, value: &str) -> Result<()>;

    /// Fails with `KeyNotFound` when absent.
    async fn get_item(&self, key: &str) -> Result<VersionedItem>;

    /// Unconditional overwrite. Seeding and tests only; the protocol never
    /// calls this.
    async fn put_item(&self, key: &str, item: VersionedItem) -> Result<Version>;

    /// Replaces the record if its stored version equals `item.version`, or
    /// creates it when the key is absent and `do_create` is set.
    ///
    /// On success every field of `item` is applied and the stored version
    /// becomes `item.version + 1`, which is returned.
    ///
    /// # Errors
    ///
    /// Returns `SeshatError::VersionMismatch` when the condition does not
    /// hold. This is the expected conflict signal, not a fault.
    async fn conditional_update(
        &self,
        key: &str,
        item: VersionedItem,
        do_create: bool,
    ) -> Result<Version>;

    /// Flips a PREPARED record to COMMITTED with `t_valid = t_commit`, if the
    /// stored version equals `version`. Returns the new version.
    async fn conditional_commit(&self, key: &str, version: Version, t_commit: i64)
    -> Result<Version>;

    /// Creates a record only if the key does not exist.
    async fn atomic_create_item(&self, key: &str, mut item: VersionedItem) -> Result<Version> {
        item.version = 0;
        self.conditional_update(key, item, true).await
    }
}

/// The CAS rule shared by in-process connectors: checks `expected` against
/// what is stored and produces the record to store.
pub(crate) fn apply_conditional_update(
    key: &str,
    stored: Option<&VersionedItem>,
    mut item: VersionedItem,
    do_create: bool,
) -> Result<VersionedItem> {
    match stored {
        None if do_create => {
            item.key = key.to_string();
            item.version = 1;
            Ok(item)
        }
        None => Err(SeshatError::VersionMismatch {
            key: key.to_string(),
            expected: item.version,
            current: None,
        }),
        Some(current) if current.version != item.version => Err(SeshatError::VersionMismatch {
            key: key.to_string(),
            expected: item.version,
            current: Some(current.version),
        }),
        Some(current) => {
            item.key = key.to_string();
            item.version = current.version + 1;
            Ok(item)
        }
    }
}

pub(crate) fn apply_conditional_commit(
    key: &str,
    stored: Option<&VersionedItem>,
    version: Version,
    t_commit: i64,
) -> Result<VersionedItem> {
    match stored {
        Some(current) if current.version == version => {
            let mut next = current.clone();
            next.txn_state = TxnState::Committed;
            next.t_valid = t_commit;
            next.version += 1;
            Ok(next)
        }
        other => Err(SeshatError::VersionMismatch {
            key: key.to_string(),
            expected: version,
            current: other.map(|i| i.version),
        }),
    }
}
