use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{TimeMode, TimeSource};
use crate::errors::Result;

/// Wall-clock microseconds, nudged forward when the clock repeats or steps back.
#[derive(Debug, Default)]
pub struct SimpleTimeSource {
    last: Mutex<i64>,
}

impl SimpleTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl TimeSource for SimpleTimeSource {
    async fn get_time(&self, _mode: TimeMode) -> Result<i64> {
        let mut last = self.last.lock();
        let ts = now_micros().max(*last + 1);
        *last = ts;
        Ok(ts)
    }

    fn observe(&self, floor: i64) {
        let mut last = self.last.lock();
        *last = (*last).max(floor);
    }

    fn last_issued(&self) -> Option<i64> {
        match *self.last.lock() {
            0 => None,
            n => Some(n),
        }
    }
}
