// Clock and deferral queue
// The scheduler reads time through a Clock and parks future dispatches in a DeferredQueue

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic time source, in seconds
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall clock measured from construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock
/// Clones share the same time, so a test keeps one handle and gives another to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        self.time.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.time.set(self.time.get() + seconds.max(0.0));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.time.get()
    }
}

/// Handle on one deferred item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken {
    due_nanos: u64,
    seq: u64,
}

/// An item handed back by the queue
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred<T> {
    pub token: TimerToken,
    /// Clock time the item was due at
    pub due: f64,
    pub payload: T,
}

fn to_nanos(seconds: f64) -> u64 {
    if seconds.is_nan() || seconds <= 0.0 {
        0
    } else {
        // Saturates for huge values
        (seconds * 1e9).round() as u64
    }
}

/// Cancellable deferral queue
/// Items come out in due order, equal due times in scheduling order.
#[derive(Debug)]
pub struct DeferredQueue<T> {
    items: BTreeMap<TimerToken, Deferred<T>>,
    next_seq: u64,
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Park `payload` until `now + delay`
    pub fn schedule_after(&mut self, now: f64, delay: f64, payload: T) -> TimerToken {
        let due = now + delay.max(0.0);
        let token = TimerToken {
            due_nanos: to_nanos(due),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.items.insert(
            token,
            Deferred {
                token,
                due,
                payload,
            },
        );
        token
    }

    /// Cancel one item; returns its payload if it was still pending
    pub fn cancel(&mut self, token: TimerToken) -> Option<T> {
        self.items.remove(&token).map(|item| item.payload)
    }

    /// Cancel everything; returns the cancelled payloads in due order
    pub fn cancel_all(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
            .into_values()
            .map(|item| item.payload)
            .collect()
    }

    /// Remove and return every item due at or before `now`
    pub fn take_due(&mut self, now: f64) -> Vec<Deferred<T>> {
        let now_nanos = to_nanos(now);
        let mut due = Vec::new();
        while let Some(entry) = self.items.first_entry() {
            if entry.key().due_nanos > now_nanos {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    /// Due time of the earliest pending item
    pub fn next_due(&self) -> Option<f64> {
        self.items.values().next().map(|item| item.due)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
