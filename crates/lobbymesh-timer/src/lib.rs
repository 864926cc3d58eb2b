//! Cancellable periodic ticker for lobbymesh's polling loops.
//!
//! The ping and heartbeat workers both need the same shape: fire every
//! fixed interval, until someone — possibly another task — says stop.
//! [`Ticker`] provides that on top of `tokio::time::interval`, so
//! suspension happens at the tick boundary rather than via manual
//! elapsed-time polling.
//!
//! # Integration
//!
//! ```ignore
//! let (mut ticker, handle) = Ticker::new(Duration::from_millis(1000));
//! tokio::spawn(async move {
//!     while ticker.tick().await {
//!         send_heartbeat().await;
//!     }
//! });
//! // elsewhere, from any task:
//! handle.stop();
//! ```

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::trace;

/// A periodic timer that can be stopped from another task.
///
/// One `Ticker` drives one worker loop. The paired [`TickerHandle`] is
/// the remote stop switch.
pub struct Ticker {
    period: Duration,
    interval: Interval,
    stop: watch::Receiver<bool>,
    stopped: bool,
}

/// Stops a [`Ticker`]. Cheap to clone; stopping twice is harmless.
///
/// Dropping every handle also stops the ticker — a worker can't outlive
/// the last thing that could have cancelled it.
#[derive(Debug, Clone)]
pub struct TickerHandle {
    stop: watch::Sender<bool>,
}

impl TickerHandle {
    /// Signals the ticker to stop. The worker observes it at the next
    /// `tick()` call, including one it is currently blocked in.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

impl Ticker {
    /// Creates a ticker firing every `period`, plus its stop handle.
    ///
    /// The first tick fires one full period after creation — there is no
    /// immediate initial tick.
    pub fn new(period: Duration) -> (Self, TickerHandle) {
        let (tx, rx) = watch::channel(false);
        let mut interval = time::interval(period);
        // Polling loops want steady pacing, not burst catch-up after a
        // stall.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // `interval` fires immediately by default; push the first tick
        // out one full period.
        interval.reset();

        (
            Self {
                period,
                interval,
                stop: rx,
                stopped: false,
            },
            TickerHandle { stop: tx },
        )
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits for the next tick.
    ///
    /// Returns `true` when the period elapsed, `false` as soon as the
    /// handle signalled stop (or every handle was dropped). Once `false`
    /// is returned, every later call returns `false` immediately.
    pub async fn tick(&mut self) -> bool {
        loop {
            if self.stopped || *self.stop.borrow() {
                self.stopped = true;
                return false;
            }
            tokio::select! {
                _ = self.interval.tick() => {
                    trace!(period_ms = self.period.as_millis() as u64, "tick");
                    return true;
                }
                changed = self.stop.changed() => {
                    match changed {
                        // All handles dropped: treat as stop.
                        Err(_) => {
                            self.stopped = true;
                            return false;
                        }
                        // Re-check the flag; a `send(false)` is not a stop.
                        Ok(()) => continue,
                    }
                }
            }
        }
    }
}
