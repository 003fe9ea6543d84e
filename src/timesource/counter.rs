use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use super::{TimeMode, TimeSource};
use crate::errors::Result;

/// Pure increment. Deterministic, for tests and single-process setups.
#[derive(Debug, Default)]
pub struct CounterTimeSource {
    counter: AtomicI64,
}

impl CounterTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first timestamp handed out will be `start + 1`.
    pub fn starting_at(start: i64) -> Self {
        Self {
            counter: AtomicI64::new(start),
        }
    }
}

#[async_trait]
impl TimeSource for CounterTimeSource {
    async fn get_time(&self, _mode: TimeMode) -> Result<i64> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn observe(&self, floor: i64) {
        self.counter.fetch_max(floor, Ordering::SeqCst);
    }

    fn last_issued(&self) -> Option<i64> {
        match self.counter.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }
}
