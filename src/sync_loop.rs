//! Periodic sync loop
//!
//! Fills the gaps host notifications leave (grid slot state, undo/redo
//! availability) by ticking at a fixed interval. The next tick is armed only
//! once the previous one has finished, so at most one tick is in flight.
//! Stopping is cooperative: a sleeping loop notices on wake-up and exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::BridgeResult;

/// Default delay between the end of one tick and the start of the next
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(300);

/// One unit of periodic work
#[async_trait]
pub trait Tick: Send + Sync {
    async fn tick(&self) -> BridgeResult<()>;
}

#[derive(Debug)]
struct LoopState {
    running: bool,
    epoch: u64,
    interval: Duration,
}

/// Idle/running timer driving a [`Tick`]
#[derive(Debug, Clone)]
pub struct SyncLoop {
    state: Arc<Mutex<LoopState>>,
}

impl SyncLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopState {
                running: false,
                epoch: 0,
                interval,
            })),
        }
    }

    /// Move idle to running and spawn the timer task. Returns `false` when
    /// the loop was already running.
    pub fn start(&self, ticker: Arc<dyn Tick>) -> bool {
        let epoch = {
            let mut state = self.state.lock();
            if state.running {
                return false;
            }
            state.running = true;
            state.epoch += 1;
            state.epoch
        };

        debug!("Sync loop started (epoch {})", epoch);
        let state = self.state.clone();
        tokio::spawn(async move {
            let _guard = EpochGuard {
                state: state.clone(),
                epoch,
            };
            while let Some(delay) = Self::armed_delay(&state, epoch) {
                tokio::time::sleep(delay).await;
                if Self::armed_delay(&state, epoch).is_none() {
                    break;
                }
                if let Err(e) = ticker.tick().await {
                    warn!("Sync tick failed: {}", e);
                }
            }
            debug!("Sync loop stopped (epoch {})", epoch);
        });
        true
    }

    /// Back to idle; the timer task exits at its next wake-up
    pub fn stop(&self) {
        self.state.lock().running = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Applies from the next re-arm
    pub fn set_interval(&self, interval: Duration) {
        let mut state = self.state.lock();
        if state.interval != interval {
            debug!("Sync interval {:?} -> {:?}", state.interval, interval);
            state.interval = interval;
        }
    }

    pub fn interval(&self) -> Duration {
        self.state.lock().interval
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Delay to sleep when the task for `epoch` may keep going
    fn armed_delay(state: &Mutex<LoopState>, epoch: u64) -> Option<Duration> {
        let state = state.lock();
        (state.running && state.epoch == epoch).then_some(state.interval)
    }
}

/// Returns the loop to idle when its task ends without being stopped, which
/// only happens when a tick panics
struct EpochGuard {
    state: Arc<Mutex<LoopState>>,
    epoch: u64,
}

impl Drop for EpochGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.running && state.epoch == self.epoch {
            warn!("Sync loop task ended unexpectedly (epoch {})", self.epoch);
            state.running = false;
        }
    }
}

impl Default for SyncLoop {
    fn default() -> Self {
        Self::new(DEFAULT_SYNC_INTERVAL)
    }
}
