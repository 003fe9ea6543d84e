use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;

use super::{TimeMode, TimeSource};
use crate::clock::{Clock, SystemClock};
use crate::errors::{Result, SeshatError};

#[derive(Debug)]
struct HybridState {
    physical: i64,
    logical: i64,
    last: i64,
}

/// Physical milliseconds in the high digits, a logical counter in the low ones.
///
/// A timestamp is `physical_ms * 10^logical_bits + logical`. The physical part
/// is refreshed by a periodic tick and whenever the logical counter comes
/// within ten of `2^logical_bits - 1`; refreshing resets the counter. Issued
/// values never repeat or go backwards, even if the wall clock does.
///
/// Construction fails when `10^logical_bits` leaves no room for the current
/// wall clock in an `i64`.
#[derive(Debug)]
pub struct HybridTimeSource {
    state: Mutex<HybridState>,
    scale: i64,
    max_logical: i64,
    clock: Arc<dyn Clock>,
}

impl HybridTimeSource {
    pub fn new(logical_bits: u32) -> Result<Self> {
        Self::with_clock(logical_bits, Arc::new(SystemClock))
    }

    pub fn with_clock(logical_bits: u32, clock: Arc<dyn Clock>) -> Result<Self> {
        let physical = clock.now_millis();
        let scale = 10_i64.checked_pow(logical_bits).filter(|scale| {
            physical
                .checked_mul(*scale)
                .and_then(|p| p.checked_add(*scale))
                .is_some()
        });
        let max_logical = 1_i64
            .checked_shl(logical_bits)
            .filter(|m| *m > 0)
            .map(|m| m - 1);
        let (Some(scale), Some(max_logical)) = (scale, max_logical) else {
            return Err(SeshatError::Config(format!(
                "{logical_bits} logical bits leave no room for physical time {physical}ms"
            )));
        };
        Ok(Self {
            state: Mutex::new(HybridState {
                physical,
                logical: 0,
                last: 0,
            }),
            scale,
            max_logical,
            clock,
        })
    }

    /// Re-reads the wall clock and resets the logical counter.
    pub fn tick(&self) {
        let mut state = self.state.lock();
        state.physical = self.clock.now_millis();
        state.logical = 0;
    }

    /// Runs [`tick`](Self::tick) every `period` until the source is dropped.
    pub fn spawn_ticker(source: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(source);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(source) => source.tick(),
                    None => {
                        debug!("hybrid time source dropped, stopping ticker");
                        break;
                    }
                }
            }
        })
    }

    fn next(&self) -> Result<i64> {
        let mut state = self.state.lock();
        if state.logical >= self.max_logical - 10 {
            state.physical = self.clock.now_millis();
            state.logical = 0;
        }
        state.logical += 1;
        let ts = state
            .physical
            .checked_mul(self.scale)
            .and_then(|p| p.checked_add(state.logical))
            .zip(state.last.checked_add(1))
            .map(|(ts, floor)| ts.max(floor))
            .ok_or_else(|| {
                SeshatError::OracleUnavailable(format!(
                    "timestamp overflow at physical time {}ms",
                    state.physical
                ))
            })?;
        state.last = ts;
        Ok(ts)
    }
}

#[async_trait]
impl TimeSource for HybridTimeSource {
    async fn get_time(&self, _mode: TimeMode) -> Result<i64> {
        self.next()
    }

    fn observe(&self, floor: i64) {
        let mut state = self.state.lock();
        state.last = state.last.max(floor);
    }

    fn last_issued(&self) -> Option<i64> {
        match self.state.lock().last {
            0 => None,
            n => Some(n),
        }
    }
}
