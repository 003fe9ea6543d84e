//! Locating the executor that serves a datastore.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::RwLock;

use crate::config::DiscoveryConfig;
use crate::errors::{Result, SeshatError};

/// A registered executor instance.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub address: String,
    pub ds_names: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub last_heartbeat: Instant,
}

#[async_trait]
pub trait ServiceDiscovery: Send + Sync + std::fmt::Debug {
    async fn register(
        &self,
        address: &str,
        ds_names: &[String],
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    async fn deregister(&self, address: &str) -> Result<()>;

    /// Address of a live instance serving `ds_name`.
    async fn get_service(&self, ds_name: &str) -> Result<String>;
}

/// Registry kept in process memory.
///
/// Instances expire when they miss heartbeats for longer than the configured
/// TTL. Lookups rotate over the live instances of a datastore.
#[derive(Debug)]
pub struct InMemoryDiscovery {
    config: DiscoveryConfig,
    services: RwLock<HashMap<String, ServiceInfo>>,
    next: AtomicUsize,
}

impl Default for InMemoryDiscovery {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

impl InMemoryDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            services: RwLock::new(HashMap::new()),
            next: AtomicUsize::new(0),
        }
    }

    /// Refreshes the heartbeat of `address`.
    pub fn heartbeat(&self, address: &str) -> Result<()> {
        let mut services = self.services.write();
        let info = services
            .get_mut(address)
            .ok_or_else(|| SeshatError::Config(format!("{address} is not registered")))?;
        info.last_heartbeat = Instant::now();
        Ok(())
    }

    /// Drops instances whose last heartbeat is older than the TTL.
    pub fn cleanup(&self) -> usize {
        let ttl = self.config.ttl;
        let mut services = self.services.write();
        let before = services.len();
        services.retain(|address, info| {
            let alive = info.last_heartbeat.elapsed() <= ttl;
            if !alive {
                info!("discovery: {address} expired");
            }
            alive
        });
        before - services.len()
    }

    /// Runs [`cleanup`](Self::cleanup) on the configured period until the
    /// registry is dropped.
    pub fn spawn_cleanup(registry: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = std::sync::Arc::downgrade(registry);
        let period = registry.config.cleanup.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(registry) => {
                        registry.cleanup();
                    }
                    None => break,
                }
            }
        })
    }

    pub fn services(&self) -> Vec<ServiceInfo> {
        let mut all: Vec<ServiceInfo> = self.services.read().values().cloned().collect();
        all.sort_by(|a, b| a.address.cmp(&b.address));
        all
    }
}

#[async_trait]
impl ServiceDiscovery for InMemoryDiscovery {
    async fn register(
        &self,
        address: &str,
        ds_names: &[String],
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        debug!("discovery: register {address} for {ds_names:?}");
        self.services.write().insert(
            address.to_string(),
            ServiceInfo {
                address: address.to_string(),
                ds_names: ds_names.to_vec(),
                metadata,
                last_heartbeat: Instant::now(),
            },
        );
        Ok(())
    }

    async fn deregister(&self, address: &str) -> Result<()> {
        debug!("discovery: deregister {address}");
        self.services.write().remove(address);
        Ok(())
    }

    async fn get_service(&self, ds_name: &str) -> Result<String> {
        let ttl = self.config.ttl;
        let mut live: Vec<String> = self
            .services
            .read()
            .values()
            .filter(|info| info.last_heartbeat.elapsed() <= ttl)
            .filter(|info| info.ds_names.iter().any(|n| n == ds_name))
            .map(|info| info.address.clone())
            .collect();
        if live.is_empty() {
            return Err(SeshatError::Network(format!(
                "no live executor serves datastore {ds_name:?}"
            )));
        }
        live.sort();
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % live.len();
        Ok(live.swap_remove(slot))
    }
}
