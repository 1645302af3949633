//! World events module
//!
//! Drives the event scheduler:
//! - Polls on a fixed interval
//! - Drains every event that is due
//! - Hands each one off on a channel to whoever consumes world events

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::scheduler::{EventKind, EventScheduler, EventTarget, ScheduledEvent};

/// Default scheduler poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// An event handed to consumers once it is due
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEvent {
    pub target: EventTarget,
    pub kind: EventKind,
    /// When the event was due
    pub due_secs: u64,
    /// When the driver picked it up
    pub delivered_secs: u64,
}

impl DueEvent {
    fn from_scheduled(event: ScheduledEvent, now_secs: u64) -> Self {
        Self {
            target: event.target,
            kind: event.kind,
            due_secs: event.due_secs,
            delivered_secs: now_secs,
        }
    }

    /// How late the event was delivered, in seconds
    pub fn lateness_secs(&self) -> u64 {
        self.delivered_secs.saturating_sub(self.due_secs)
    }
}

/// Scheduler driver
pub struct WorldEvents {
    scheduler: Arc<EventScheduler>,
    poll_interval: Duration,
    events_tx: mpsc::UnboundedSender<DueEvent>,
    delivered: AtomicU64,
}

impl WorldEvents {
    /// Create a driver and the receiving end of its event channel
    pub fn new(
        scheduler: Arc<EventScheduler>,
        poll_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<DueEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let driver = Self {
            scheduler,
            poll_interval,
            events_tx,
            delivered: AtomicU64::new(0),
        };
        (driver, events_rx)
    }

    /// Total events handed off so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Hand off every event due at `now_secs`. Returns how many were sent.
    pub fn drain_ready(&self, now_secs: u64) -> usize {
        let mut sent = 0;
        while let Some(event) = self.scheduler.poll_ready(now_secs) {
            let event = DueEvent::from_scheduled(event, now_secs);
            debug!(
                event_target = ?event.target,
                kind = ?event.kind,
                due_secs = event.due_secs,
                "Event due"
            );
            if self.events_tx.send(event).is_err() {
                warn!("World event consumer is gone; dropping due event");
                continue;
            }
            sent += 1;
        }
        self.delivered.fetch_add(sent as u64, Ordering::SeqCst);
        sent
    }

    /// Poll until shutdown
    pub async fn run(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting world event driver"
        );

        let mut poll_interval = interval(self.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.drain_ready(EventScheduler::now_secs());
                }
                _ = shutdown_rx.recv() => {
                    info!("World event driver shutting down");
                    break;
                }
            }
        }

        info!(
            delivered = self.delivered(),
            pending = self.scheduler.len(),
            "World event driver stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_ready_hands_off_due_events() {
        let scheduler = Arc::new(EventScheduler::new());
        scheduler.schedule_at(10, EventTarget::Tree { id: 3 }, EventKind::TreeRespawn);
        scheduler.schedule_at(12, EventTarget::World, EventKind::PeriodicSave);
        scheduler.schedule_at(99, EventTarget::World, EventKind::PeriodicSave);

        let (driver, mut events_rx) = WorldEvents::new(scheduler.clone(), Duration::from_millis(10));
        assert_eq!(driver.drain_ready(12), 2);

        let first = events_rx.try_recv().unwrap();
        assert_eq!(first.target, EventTarget::Tree { id: 3 });
        assert_eq!(first.lateness_secs(), 2);
        let second = events_rx.try_recv().unwrap();
        assert_eq!(second.kind, EventKind::PeriodicSave);
        assert!(events_rx.try_recv().is_err());

        assert_eq!(driver.delivered(), 2);
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test]
    async fn test_run_delivers_and_stops_on_shutdown() {
        let scheduler = Arc::new(EventScheduler::new());
        scheduler.schedule_at(0, EventTarget::Session(1), EventKind::Custom(9));

        let (driver, mut events_rx) = WorldEvents::new(scheduler, Duration::from_millis(10));
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(async move {
            driver.run(&mut shutdown_rx).await;
            driver.delivered()
        });

        let event = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::Custom(9));

        shutdown_tx.send(()).unwrap();
        let delivered = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, 1);
    }
}
