use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;

use super::{
    Connector, ConnectorCapabilities, apply_conditional_commit, apply_conditional_update,
};
use crate::errors::{NotFoundKind, Result, SeshatError};
use crate::item::{Version, VersionedItem};

/// An in-process backend.
///
/// Each operation holds the map lock for its whole duration, so conditional
/// operations are atomic with respect to every other caller sharing the
/// connector. Clones of the `Arc` that wraps it see the same data.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    items: Mutex<HashMap<String, VersionedItem>>,
    names: Mutex<HashMap<String, String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn capabilities(&self) -> ConnectorCapabilities {
        ConnectorCapabilities {
            server_side_cas: true,
            atomic_create: true,
            persistent: false,
        }
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<String> {
        self.names
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| SeshatError::not_found(name, NotFoundKind::InStore))
    }

    async fn put(&self, name: &str, value: &str) -> Result<()> {
        self.names.lock().insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.names.lock().remove(name);
        Ok(())
    }

    async fn atomic_create(&self, name: &str, value: &str) -> Result<()> {
        let mut names = self.names.lock();
        if let Some(existing) = names.get(name) {
            return Err(SeshatError::KeyExists {
                key: name.to_string(),
                existing: existing.clone(),
            });
        }
        names.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn get_item(&self, key: &str) -> Result<VersionedItem> {
        self.items
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| SeshatError::not_found(key, NotFoundKind::InStore))
    }

    async fn put_item(&self, key: &str, mut item: VersionedItem) -> Result<Version> {
        let mut items = self.items.lock();
        item.key = key.to_string();
        item.version = items.get(key).map_or(1, |i| i.version + 1);
        let version = item.version;
        items.insert(key.to_string(), item);
        Ok(version)
    }

    async fn conditional_update(
        &self,
        key: &str,
        item: VersionedItem,
        do_create: bool,
    ) -> Result<Version> {
        let mut items = self.items.lock();
        let next = apply_conditional_update(key, items.get(key), item, do_create)?;
        let version = next.version;
        debug!("memory: {} -> version {} ({:?})", key, version, next.txn_state);
        items.insert(key.to_string(), next);
        Ok(version)
    }

    async fn conditional_commit(
        &self,
        key: &str,
        version: Version,
        t_commit: i64,
    ) -> Result<Version> {
        let mut items = self.items.lock();
        let next = apply_conditional_commit(key, items.get(key), version, t_commit)?;
        let version = next.version;
        items.insert(key.to_string(), next);
        Ok(version)
    }
}
