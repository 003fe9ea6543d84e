use std::path::PathBuf;
use std::sync::Arc;

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};

use super::{Connector, ConnectorCapabilities, MemoryConnector};
use crate::errors::{Result, SeshatError};

/// Constructor of one backend kind.
pub type ConnectorFactory =
    Arc<dyn Fn(&ConnectorConfig) -> Result<Arc<dyn Connector>> + Send + Sync>;

/// What a factory needs to build a connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Registered backend kind, e.g. `"memory"`.
    pub kind: String,
    /// Location of on-disk backends.
    pub path: Option<PathBuf>,
    /// Backend-specific settings such as addresses or credentials.
    pub options: std::collections::BTreeMap<String, String>,
}

impl ConnectorConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }
}

/// Name-keyed table of connector constructors.
///
/// New backends register here; nothing in the coordinator matches on backend
/// names.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    factories: HashMap<String, (ConnectorCapabilities, ConnectorFactory)>,
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every backend compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "memory",
            ConnectorCapabilities {
                server_side_cas: true,
                atomic_create: true,
                persistent: false,
            },
            Arc::new(|_cfg: &ConnectorConfig| {
                Ok(Arc::new(MemoryConnector::new()) as Arc<dyn Connector>)
            }),
        );
        #[cfg(feature = "rocksdb")]
        registry.register(
            "rocksdb",
            ConnectorCapabilities {
                server_side_cas: false,
                atomic_create: true,
                persistent: true,
            },
            Arc::new(|cfg: &ConnectorConfig| {
                let path = cfg.path.as_ref().ok_or_else(|| {
                    SeshatError::Config("rocksdb connector requires a path".to_string())
                })?;
                Ok(Arc::new(super::RocksConnector::open(path)?) as Arc<dyn Connector>)
            }),
        );
        registry
    }

    /// Registers `factory` under `kind`, replacing any previous entry.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        capabilities: ConnectorCapabilities,
        factory: ConnectorFactory,
    ) {
        self.factories.insert(kind.into(), (capabilities, factory));
    }

    pub fn capabilities(&self, kind: &str) -> Option<ConnectorCapabilities> {
        self.factories.get(kind).map(|(caps, _)| *caps)
    }

    /// Builds a connector of `config.kind`.
    pub fn create(&self, config: &ConnectorConfig) -> Result<Arc<dyn Connector>> {
        let (_, factory) = self.factories.get(&config.kind).ok_or_else(|| {
            SeshatError::Config(format!("unknown connector kind {:?}", config.kind))
        })?;
        factory(config)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
