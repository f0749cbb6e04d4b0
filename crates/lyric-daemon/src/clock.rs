/// PlaybackClock — periodic driver that advances the simulated position.
///
/// The clock knows nothing about playback; it only pushes `Tick` events into
/// the same delivery channel the ingestion pipeline uses, so ticks and
/// now-playing events are applied one after another on the core task.
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::core::DaemonEvent;

/// Position advance per tick, in milliseconds.
pub const TICK_MS: u64 = 200;

pub struct PlaybackClock;

impl PlaybackClock {
    /// Spawn the driver.  It stops once the core has dropped its receiver.
    pub fn spawn(delivery: mpsc::UnboundedSender<DaemonEvent>) -> tokio::task::JoinHandle<()> {
        Self::spawn_with_period(delivery, Duration::from_millis(TICK_MS), TICK_MS)
    }

    pub fn spawn_with_period(
        delivery: mpsc::UnboundedSender<DaemonEvent>,
        period: Duration,
        step_ms: u64,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // A stalled runtime should not replay a burst of catch-up ticks.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so a fresh track
            // starts from 0.
            interval.tick().await;

            loop {
                interval.tick().await;
                if delivery.send(DaemonEvent::Tick { step_ms }).is_err() {
                    debug!("clock: delivery channel closed, stopping");
                    break;
                }
            }
        })
    }
}
