use ahash::AHashMap as HashMap;

use super::{PendingWrite, ReadView};

/// A value or tombstone waiting for commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferedWrite {
    Put(Vec<u8>),
    Delete,
}

/// Read cache and write buffer of one attempt on one datastore.
///
/// Nothing here is shared: each attempt owns its buffers and drops them when
/// it finishes.
#[derive(Debug, Default)]
pub struct TxnBuffer {
    reads: HashMap<String, ReadView>,
    writes: HashMap<String, BufferedWrite>,
}

impl TxnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_read(&self, key: &str) -> Option<&ReadView> {
        self.reads.get(key)
    }

    pub fn cache_read(&mut self, key: impl Into<String>, view: ReadView) {
        self.reads.insert(key.into(), view);
    }

    pub fn buffered_write(&self, key: &str) -> Option<&BufferedWrite> {
        self.writes.get(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.insert(key.into(), BufferedWrite::Put(value));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.insert(key.into(), BufferedWrite::Delete);
    }

    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Buffered keys, sorted.
    pub fn write_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.writes.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The buffered writes paired with what this attempt read for each key.
    pub fn pending_writes(&self) -> Vec<PendingWrite> {
        let mut writes: Vec<(&String, &BufferedWrite)> = self.writes.iter().collect();
        writes.sort_by(|a, b| a.0.cmp(b.0));
        writes
            .into_iter()
            .map(|(key, write)| {
                let (value, is_deleted) = match write {
                    BufferedWrite::Put(value) => (value.clone(), false),
                    BufferedWrite::Delete => (Vec::new(), true),
                };
                PendingWrite {
                    key: key.clone(),
                    value,
                    is_deleted,
                    base: self.reads.get(key).cloned(),
                }
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.reads.clear();
        self.writes.clear();
    }
}
