use std::hash::BuildHasher;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::DB;

use super::{
    Connector, ConnectorCapabilities, apply_conditional_commit, apply_conditional_update,
};
use crate::errors::{NotFoundKind, Result, SeshatError};
use crate::item::{Version, VersionedItem};

const LOCK_STRIPES: usize = 64;
const ITEM_PREFIX: &str = "item:";
const NAME_PREFIX: &str = "name:";

/// A RocksDB-backed connector.
///
/// RocksDB has no compare-and-swap, so conditional operations take a striped
/// lock around their read-compare-write. This makes them atomic for every
/// caller in the process that owns the database, which is the only process
/// RocksDB lets open it.
pub struct RocksConnector {
    db: DB,
    stripes: Vec<Mutex<()>>,
    hasher: ahash::RandomState,
}

impl std::fmt::Debug for RocksConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksConnector")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksConnector {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = DB::open_default(path).map_err(|e| SeshatError::connector("open", e))?;
        Ok(Self {
            db,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            hasher: ahash::RandomState::new(),
        })
    }

    fn stripe(&self, key: &str) -> &Mutex<()> {
        let slot = self.hasher.hash_one(key) as usize % LOCK_STRIPES;
        &self.stripes[slot]
    }

    fn load_item(&self, key: &str) -> Result<Option<VersionedItem>> {
        let raw = self
            .db
            .get(format!("{ITEM_PREFIX}{key}"))
            .map_err(|e| SeshatError::connector("get_item", e))?;
        raw.map(|bytes| bincode::deserialize(&bytes).map_err(SeshatError::from))
            .transpose()
    }

    fn store_item(&self, key: &str, item: &VersionedItem) -> Result<()> {
        let bytes = bincode::serialize(item)?;
        self.db
            .put(format!("{ITEM_PREFIX}{key}"), bytes)
            .map_err(|e| SeshatError::connector("put_item", e))
    }

    fn load_name(&self, name: &str) -> Result<Option<String>> {
        let raw = self
            .db
            .get(format!("{NAME_PREFIX}{name}"))
            .map_err(|e| SeshatError::connector("get", e))?;
        Ok(raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[async_trait]
impl Connector for RocksConnector {
    fn capabilities(&self) -> ConnectorCapabilities {
        ConnectorCapabilities {
            server_side_cas: false,
            atomic_create: true,
            persistent: true,
        }
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<String> {
        self.load_name(name)?
            .ok_or_else(|| SeshatError::not_found(name, NotFoundKind::InStore))
    }

    async fn put(&self, name: &str, value: &str) -> Result<()> {
        self.db
            .put(format!("{NAME_PREFIX}{name}"), value.as_bytes())
            .map_err(|e| SeshatError::connector("put", e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.db
            .delete(format!("{NAME_PREFIX}{name}"))
            .map_err(|e| SeshatError::connector("delete", e))
    }

    async fn atomic_create(&self, name: &str, value: &str) -> Result<()> {
        let _guard = self.stripe(name).lock();
        if let Some(existing) = self.load_name(name)? {
            return Err(SeshatError::KeyExists {
                key: name.to_string(),
                existing,
            });
        }
        self.db
            .put(format!("{NAME_PREFIX}{name}"), value.as_bytes())
            .map_err(|e| SeshatError::connector("atomic_create", e))
    }

    async fn get_item(&self, key: &str) -> Result<VersionedItem> {
        self.load_item(key)?
            .ok_or_else(|| SeshatError::not_found(key, NotFoundKind::InStore))
    }

    async fn put_item(&self, key: &str, mut item: VersionedItem) -> Result<Version> {
        let _guard = self.stripe(key).lock();
        item.key = key.to_string();
        item.version = self.load_item(key)?.map_or(1, |i| i.version + 1);
        self.store_item(key, &item)?;
        Ok(item.version)
    }

    async fn conditional_update(
        &self,
        key: &str,
        item: VersionedItem,
        do_create: bool,
    ) -> Result<Version> {
        let _guard = self.stripe(key).lock();
        let stored = self.load_item(key)?;
        let next = apply_conditional_update(key, stored.as_ref(), item, do_create)?;
        self.store_item(key, &next)?;
        Ok(next.version)
    }

    async fn conditional_commit(
        &self,
        key: &str,
        version: Version,
        t_commit: i64,
    ) -> Result<Version> {
        let _guard = self.stripe(key).lock();
        let stored = self.load_item(key)?;
        let next = apply_conditional_commit(key, stored.as_ref(), version, t_commit)?;
        self.store_item(key, &next)?;
        Ok(next.version)
    }
}
