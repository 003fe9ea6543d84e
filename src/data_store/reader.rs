use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::executor::ConnectorMap;
use super::tsr::{self, TsrRecord};
use super::ReadView;
use crate::clock::Clock;
use crate::connector::Connector;
use crate::errors::{NotFoundKind, Result, SeshatError};
use crate::item::{ItemSnapshot, Version, VersionedItem};

/// Hit statistics of the TSR cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheStats {
    pub cache_request: u64,
    pub cache_hit: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.cache_request == 0 {
            0.0
        } else {
            self.cache_hit as f64 / self.cache_request as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheRequest: {}, CacheHit: {}, HitRate: {:.2}",
            self.cache_request,
            self.cache_hit,
            self.hit_rate()
        )
    }
}

/// Outcomes kept by a [`Reader`] unless configured otherwise.
pub const DEFAULT_OUTCOME_CAPACITY: usize = 65_536;

/// Snapshot reads with stale-prepare resolution.
///
/// The reader is shared by all attempts of a process. Its only mutable state
/// is a cache of resolved transaction outcomes; a TSR never changes once
/// written, so cached outcomes cannot go stale. The cache is sharded, so
/// lookups for unrelated transactions do not contend. It holds at most
/// `capacity` outcomes and evicts the oldest insertion first.
#[derive(Debug)]
pub struct Reader {
    connectors: ConnectorMap,
    clock: Arc<dyn Clock>,
    outcomes: DashMap<String, TsrRecord>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl Reader {
    pub fn new(connectors: ConnectorMap, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(connectors, clock, DEFAULT_OUTCOME_CAPACITY)
    }

    pub fn with_capacity(connectors: ConnectorMap, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            connectors,
            clock,
            outcomes: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn connector(&self, ds: &str) -> Result<&Arc<dyn Connector>> {
        self.connectors
            .get(ds)
            .ok_or_else(|| SeshatError::Config(format!("no connector for datastore {ds:?}")))
    }

    pub(crate) fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            cache_request: self.requests.load(Ordering::Relaxed),
            cache_hit: self.hits.load(Ordering::Relaxed),
        }
    }

    /// Number of outcomes currently cached.
    pub fn cached_outcomes(&self) -> usize {
        self.outcomes.len()
    }

    pub fn clear_cache(&self) {
        let mut order = self.order.lock();
        order.clear();
        self.outcomes.clear();
        self.requests.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
    }

    /// The version of `key` in datastore `ds` visible at `start_ts`.
    ///
    /// A visible tombstone is returned as a view; callers decide what a
    /// deleted key means to them.
    ///
    /// # Errors
    ///
    /// * `KeyNotFound(InStore)` if the key was never written.
    /// * `KeyNotFound(InHistory)` if no retained version is visible.
    /// * `DirtyRead` if the newest relevant version is PREPARED and its lease
    ///   has not expired.
    pub async fn read(&self, ds: &str, key: &str, start_ts: i64) -> Result<ReadView> {
        let conn = self.connector(ds)?;
        let head = conn.get_item(key).await?;
        self.resolve(conn.as_ref(), head, start_ts).await
    }

    async fn resolve(
        &self,
        conn: &dyn Connector,
        mut head: VersionedItem,
        start_ts: i64,
    ) -> Result<ReadView> {
        if head.is_prepared() {
            // The writer's start timestamp bounds its commit timestamp from
            // below, so this version cannot be visible whatever its outcome.
            if head.t_valid > start_ts {
                return walk(&head, head.prev, start_ts);
            }
            if !head.is_lease_expired(self.clock.now_millis()) {
                debug!("dirty read on {}: lease until {}", head.key, head.t_lease);
                return Err(SeshatError::DirtyRead { key: head.key });
            }
            let outcome = self.outcome_of(&head).await?;
            if outcome.is_committed() {
                let mut snapshot = head.resolved_snapshot(outcome.t_commit);
                if let Some(version) = self.roll_forward(conn, &head, outcome.t_commit).await {
                    snapshot.version = version;
                }
                if snapshot.is_visible_at(start_ts) {
                    return Ok(view(&head, snapshot));
                }
                return walk(&head, head.prev, start_ts);
            }
            match self.roll_back(conn, &head).await {
                Some(restored) => head = restored,
                None => return walk(&head, head.prev, start_ts),
            }
        }

        let snapshot = head.head_snapshot();
        if snapshot.is_visible_at(start_ts) {
            return Ok(view(&head, snapshot));
        }
        walk(&head, head.prev, start_ts)
    }

    /// Outcome of the transaction that wrote `item`, arbitrating ABORTED when
    /// the lease ran out before any outcome was recorded.
    async fn outcome_of(&self, item: &VersionedItem) -> Result<TsrRecord> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(cached) = self.outcomes.get(&item.txn_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*cached);
        }
        let store = self.connector(&item.tsr_store)?;
        let record = match tsr::read(store.as_ref(), &item.txn_id).await? {
            Some(record) => record,
            None => tsr::create(store.as_ref(), &item.txn_id, TsrRecord::aborted()).await?,
        };
        self.remember(&item.txn_id, record);
        Ok(record)
    }

    fn remember(&self, txn_id: &str, record: TsrRecord) {
        let mut order = self.order.lock();
        if self.outcomes.insert(txn_id.to_string(), record).is_none() {
            order.push_back(txn_id.to_string());
        }
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                self.outcomes.remove(&evicted);
            }
        }
    }

    /// Best-effort PREPARED -> COMMITTED rewrite. Losing the CAS is fine: the
    /// owner or another reader got there first.
    async fn roll_forward(
        &self,
        conn: &dyn Connector,
        head: &VersionedItem,
        t_commit: i64,
    ) -> Option<Version> {
        match conn.conditional_commit(&head.key, head.version, t_commit).await {
            Ok(version) => {
                debug!("rolled {} forward to version {version}", head.key);
                Some(version)
            }
            Err(e) => {
                debug!("roll forward of {} skipped: {e}", head.key);
                None
            }
        }
    }

    /// Best-effort undo of an aborted PREPARED head. Returns the restored
    /// record when the CAS went through.
    async fn roll_back(&self, conn: &dyn Connector, head: &VersionedItem) -> Option<VersionedItem> {
        let mut restored = head.rolled_back();
        match conn.conditional_update(&head.key, restored.clone(), false).await {
            Ok(version) => {
                debug!("rolled back {} to version {version}", head.key);
                restored.version = version;
                Some(restored)
            }
            Err(e) => {
                debug!("roll back of {} skipped: {e}", head.key);
                None
            }
        }
    }
}

fn view(head: &VersionedItem, snapshot: ItemSnapshot) -> ReadView {
    let history = head.walk_from(snapshot.prev).cloned().collect();
    ReadView { snapshot, history }
}

/// First retained snapshot at or after `from` that is visible at `start_ts`.
fn walk(head: &VersionedItem, from: Option<Version>, start_ts: i64) -> Result<ReadView> {
    head.walk_from(from)
        .find(|s| s.is_visible_at(start_ts))
        .map(|s| view(head, s.clone()))
        .ok_or_else(|| SeshatError::not_found(head.key.clone(), NotFoundKind::InHistory))
}
