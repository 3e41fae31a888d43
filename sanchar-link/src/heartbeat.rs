//! Heartbeat scheduling
//!
//! A dedicated thread posts [`Trigger::HeartbeatTick`] at a fixed period,
//! independent of command traffic. The dispatch loop builds the heartbeat
//! itself, so the tick carries no data and can never observe half-applied
//! state.

use crate::error::{Error, Result};
use crate::firmware::Trigger;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Source of the link signal strength reported in heartbeats
pub trait SignalSource: Send {
    /// Received signal strength in dBm
    fn rssi(&mut self) -> i32;
}

/// Constant signal strength, for hosts where the radio is not ours to query
#[derive(Debug, Clone, Copy)]
pub struct FixedSignal(pub i32);

impl SignalSource for FixedSignal {
    fn rssi(&mut self) -> i32 {
        self.0
    }
}

/// Spawn the heartbeat ticker.
///
/// Sleeps in short slices so shutdown is noticed well within one period.
pub fn spawn_ticker(
    period: Duration,
    triggers: Sender<Trigger>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    const SLICE: Duration = Duration::from_millis(50);

    thread::Builder::new()
        .name("heartbeat".to_string())
        .spawn(move || {
            log::debug!("Heartbeat ticker started ({} ms)", period.as_millis());
            'ticks: while running.load(Ordering::Relaxed) {
                let mut remaining = period;
                while !remaining.is_zero() {
                    if !running.load(Ordering::Relaxed) {
                        break 'ticks;
                    }
                    let step = remaining.min(SLICE);
                    thread::sleep(step);
                    remaining -= step;
                }
                if triggers.send(Trigger::HeartbeatTick).is_err() {
                    break;
                }
            }
            log::debug!("Heartbeat ticker exiting");
        })
        .map_err(|e| Error::Other(format!("Failed to spawn heartbeat thread: {}", e)))
}
