//! Event scheduler
//!
//! A due-time ordered queue of deferred world events. Any task may schedule;
//! one driver (`game::world::WorldEvents`) polls. Due times are whole seconds
//! since the Unix epoch, and events with the same due time come out in the
//! order they were scheduled.
//!
//! The scheduler only orders and hands out events. Acting on them is up to
//! whoever receives them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::trace;

use crate::net::session::SessionId;

/// Who a scheduled event is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    /// The world as a whole
    World,
    /// A tree that can be harvested and regrows
    Tree { id: u32 },
    /// A connected session
    Session(SessionId),
}

/// What kind of event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TreeRespawn,
    PeriodicSave,
    /// Open-ended kinds for other consumers
    Custom(u32),
}

/// An event waiting in the scheduler
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// Seconds since the Unix epoch at which the event becomes due
    pub due_secs: u64,
    /// Insertion order, for tiebreaking within a second
    pub sequence: u64,
    pub target: EventTarget,
    pub kind: EventKind,
}

// Min-heap on (due_secs, sequence): reverse the ordering for BinaryHeap.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due_secs == other.due_secs && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_secs
            .cmp(&self.due_secs)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
}

/// Thread-safe due-time scheduler
#[derive(Debug, Default)]
pub struct EventScheduler {
    queue: Mutex<EventQueue>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in whole seconds since the Unix epoch
    pub fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Schedule an event `delay` from now. Partial seconds round up.
    pub fn schedule(&self, target: EventTarget, kind: EventKind, delay: Duration) -> u64 {
        let mut delay_secs = delay.as_secs();
        if delay.subsec_nanos() > 0 {
            delay_secs += 1;
        }
        self.schedule_at(Self::now_secs().saturating_add(delay_secs), target, kind)
    }

    /// Schedule an event at an absolute due time. Returns its sequence number.
    pub fn schedule_at(&self, due_secs: u64, target: EventTarget, kind: EventKind) -> u64 {
        let mut queue = self.queue.lock();
        let sequence = queue.next_sequence;
        queue.next_sequence += 1;
        queue.heap.push(ScheduledEvent {
            due_secs,
            sequence,
            target,
            kind,
        });
        trace!(due_secs, sequence, ?target, ?kind, "Event scheduled");
        sequence
    }

    /// Remove and return the earliest event if it is due at `now_secs`.
    ///
    /// Returns `None` when the queue is empty or nothing is due yet.
    pub fn poll_ready(&self, now_secs: u64) -> Option<ScheduledEvent> {
        let mut queue = self.queue.lock();
        if queue.heap.peek().is_some_and(|e| e.due_secs <= now_secs) {
            queue.heap.pop()
        } else {
            None
        }
    }

    /// Due time of the earliest pending event
    pub fn next_due(&self) -> Option<u64> {
        self.queue.lock().heap.peek().map(|e| e.due_secs)
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.queue.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().heap.is_empty()
    }
}
