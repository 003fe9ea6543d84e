use super::{ItemSnapshot, Version, VersionedItem};

/// Walks a record's history arena from newest to oldest.
///
/// Each step is a lookup of the `prev` version in the arena. The walk stops at
/// a missing link and never takes more steps than the arena has entries, so a
/// corrupt arena cannot loop forever.
pub struct HistoryIter<'a> {
    item: &'a VersionedItem,
    next: Option<Version>,
    remaining: usize,
}

impl<'a> Iterator for HistoryIter<'a> {
    type Item = &'a ItemSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let snapshot = self.item.find(self.next?)?;
        self.remaining -= 1;
        self.next = snapshot.prev;
        Some(snapshot)
    }
}

impl VersionedItem {
    /// Arena lookup by version.
    pub fn find(&self, version: Version) -> Option<&ItemSnapshot> {
        self.history.iter().find(|s| s.version == version)
    }

    /// Snapshots behind the head, newest first.
    pub fn walk_history(&self) -> HistoryIter<'_> {
        self.walk_from(self.prev)
    }

    pub(crate) fn walk_from(&self, version: Option<Version>) -> HistoryIter<'_> {
        HistoryIter {
            item: self,
            next: version,
            remaining: self.history.len(),
        }
    }

    /// `start` followed by what it links to in this record's arena, at most
    /// `capacity` entries.
    pub fn chain_from(&self, start: &ItemSnapshot, capacity: usize) -> Vec<ItemSnapshot> {
        let older: Vec<ItemSnapshot> = self.walk_from(start.prev).cloned().collect();
        bounded_chain(start, &older, capacity)
    }
}

/// `base` followed by `older`, cut to `capacity` entries. The last kept entry
/// loses its `prev` link since its predecessor is no longer retained.
pub fn bounded_chain(base: &ItemSnapshot, older: &[ItemSnapshot], capacity: usize) -> Vec<ItemSnapshot> {
    let mut chain: Vec<ItemSnapshot> = std::iter::once(base)
        .chain(older.iter())
        .take(capacity)
        .cloned()
        .collect();
    if chain.len() < older.len() + 1 {
        if let Some(tail) = chain.last_mut() {
            tail.prev = None;
        }
    }
    chain
}
