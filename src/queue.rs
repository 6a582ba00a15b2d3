// Bounded MPMC queue using Mutex + two Condvars - monitor-style
// Producers block while the ring is full, consumers block while it is
// empty and the expected item count has not been consumed yet.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub consumed: u64,
    pub expected: u64,
    pub max_occupancy: u64,
    pub total_wait: Duration,
}

impl QueueStats {
    /// Mean time an item spent resident in the queue, in microseconds.
    /// Normalized over the expected total, matching the reported aggregate
    /// even if a run was closed early.
    pub fn mean_wait_micros(&self) -> f64 {
        self.total_wait.as_secs_f64() / (self.expected.max(1) as f64) * 1_000_000.0
    }
}

struct Slot<T> {
    item: T,
    enqueued_at: Instant,
}

struct Ring<T> {
    slots: Vec<Option<Slot<T>>>,
    head: usize,
    tail: usize,
    full: bool,
    empty: bool,
    closed: bool,
    enqueued: u64,
    consumed: u64,
    total_wait: Duration,
    max_occupancy: usize,
}

impl<T> Ring<T> {
    fn len(&self) -> usize {
        if self.full {
            self.slots.len()
        } else if self.empty {
            0
        } else if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.slots.len() - self.head + self.tail
        }
    }
}

/// Fixed-capacity work queue shared by producer and consumer threads.
///
/// All ring state, the consumed counter, and the wait-time accumulator sit
/// behind a single mutex; `push`, `pop`, `close`, and `stats` are the only
/// entry points that touch it. Consumers treat `consumed == expected` as
/// terminal, so the expected total must be known at construction time.
pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    expected: u64,
}

impl<T> BoundedQueue<T> {
    /// `capacity` slots, terminal once `expected` items have been popped.
    pub fn new(capacity: usize, expected: u64) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                full: false,
                empty: true,
                closed: false,
                enqueued: 0,
                consumed: 0,
                total_wait: Duration::ZERO,
                max_occupancy: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            expected,
        }
    }

    /// Blocking enqueue. Suspends while the ring is full; wakes one waiting
    /// consumer afterwards. Returns false if the queue was closed before a
    /// slot opened up, in which case the item is dropped and the caller
    /// should stop producing.
    pub fn push(&self, item: T) -> bool {
        let mut guard = self.ring.lock();
        while guard.full && !guard.closed {
            self.not_full.wait(&mut guard);
        }
        if guard.closed {
            return false;
        }
        let ring = &mut *guard;
        // Stamp under the lock so the wait measurement starts at the moment
        // the item actually becomes available, not after a wakeup race.
        ring.slots[ring.tail] = Some(Slot {
            item,
            enqueued_at: Instant::now(),
        });
        ring.tail = (ring.tail + 1) % ring.slots.len();
        ring.full = ring.tail == ring.head;
        ring.empty = false;
        ring.enqueued += 1;
        let occupancy = ring.len();
        if occupancy > ring.max_occupancy {
            ring.max_occupancy = occupancy;
        }
        drop(guard);
        self.not_empty.notify_one();
        true
    }

    /// Blocking dequeue. Returns None once the expected total has been
    /// consumed (or the queue was closed); every terminal return broadcasts
    /// not-empty so the whole consumer pool observes completion.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.ring.lock();
        loop {
            if !guard.empty {
                break;
            }
            if guard.consumed >= self.expected || guard.closed {
                drop(guard);
                self.not_empty.notify_all();
                return None;
            }
            self.not_empty.wait(&mut guard);
        }
        let ring = &mut *guard;
        let dequeued_at = Instant::now();
        let slot = ring.slots[ring.head]
            .take()
            .expect("non-empty ring has an occupied head slot");
        ring.head = (ring.head + 1) % ring.slots.len();
        ring.empty = ring.head == ring.tail;
        ring.full = false;
        ring.consumed += 1;
        ring.total_wait += dequeued_at.duration_since(slot.enqueued_at);
        let finished = ring.consumed >= self.expected;
        drop(guard);
        self.not_full.notify_one();
        if finished {
            self.not_empty.notify_all();
        }
        Some(slot.item)
    }

    /// Close the queue and wake every blocked worker. Blocked producers give
    /// up their item, consumers drain what is resident and then go terminal.
    pub fn close(&self) {
        let mut ring = self.ring.lock();
        if ring.closed {
            return;
        }
        ring.closed = true;
        drop(ring);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn stats(&self) -> QueueStats {
        let ring = self.ring.lock();
        QueueStats {
            enqueued: ring.enqueued,
            consumed: ring.consumed,
            expected: self.expected,
            max_occupancy: ring.max_occupancy as u64,
            total_wait: ring.total_wait,
        }
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().empty
    }

    pub fn is_full(&self) -> bool {
        self.ring.lock().full
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }
}
