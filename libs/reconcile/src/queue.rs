//! Keyed work queue with delayed and rate-limited adds.
//!
//! The queue keeps three sets per key:
//!
//! ```text
//! dirty       key needs processing (queued, or re-added while processing)
//! processing  key is held by a worker between get() and done()
//! waiting     key is scheduled to be added at a later instant
//! ```
//!
//! A key is never handed to two workers at once. Adding a key that is
//! already dirty is a no-op; adding a key that is being processed marks it
//! dirty so that `done()` puts it back on the queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::rate_limit::ItemExponentialRateLimiter;

/// Shared work queue. Wrap in an `Arc` to hand to workers.
pub struct WorkQueue<K> {
    name: String,
    state: Mutex<State<K>>,
    notify: Notify,
    limiter: ItemExponentialRateLimiter<K>,
}

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,

    /// Min-heap of pending delayed adds. Entries superseded by an earlier
    /// deadline for the same key are skipped when popped.
    waiting: BinaryHeap<Delayed<K>>,
    deadlines: HashMap<K, Instant>,
    seq: u64,

    shutting_down: bool,
}

struct Delayed<K> {
    ready_at: Instant,
    seq: u64,
    key: K,
}

impl<K> PartialEq for Delayed<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<K> Eq for Delayed<K> {}

impl<K> PartialOrd for Delayed<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Delayed<K> {
    // Reversed so the BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<K: Eq + Hash + Clone> State<K> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            waiting: BinaryHeap::new(),
            deadlines: HashMap::new(),
            seq: 0,
            shutting_down: false,
        }
    }

    /// Returns true if the key was pushed onto the queue.
    fn add(&mut self, key: K) -> bool {
        if self.shutting_down || self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    /// Move every delayed add whose deadline has passed onto the queue.
    fn promote_ready(&mut self, now: Instant) {
        while self.waiting.peek().is_some_and(|d| d.ready_at <= now) {
            let Some(entry) = self.waiting.pop() else {
                break;
            };
            if self.deadlines.get(&entry.key) != Some(&entry.ready_at) {
                continue;
            }
            self.deadlines.remove(&entry.key);
            self.add(entry.key);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.waiting.peek().map(|d| d.ready_at)
    }
}

impl<K: Eq + Hash + Clone + Send> WorkQueue<K> {
    /// Create a queue with the default per-key rate limiter.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rate_limiter(name, ItemExponentialRateLimiter::default())
    }

    pub fn with_rate_limiter(
        name: impl Into<String>,
        limiter: ItemExponentialRateLimiter<K>,
    ) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::new()),
            notify: Notify::new(),
            limiter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark a key as needing processing.
    pub fn add(&self, key: K) {
        let pushed = self.state.lock().add(key);
        if pushed {
            self.notify.notify_waiters();
        }
    }

    /// Add a key once `delay` has elapsed. If the key is already waiting,
    /// the earlier of the two deadlines wins.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let ready_at = Instant::now() + delay;
        {
            let mut state = self.state.lock();
            if state.shutting_down {
                return;
            }
            if state
                .deadlines
                .get(&key)
                .is_some_and(|existing| *existing <= ready_at)
            {
                return;
            }
            state.deadlines.insert(key.clone(), ready_at);
            state.seq += 1;
            let seq = state.seq;
            state.waiting.push(Delayed { ready_at, seq, key });
        }
        // A worker may be sleeping until a later deadline.
        self.notify.notify_waiters();
    }

    /// Add a key after the rate limiter's delay for it.
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.limiter.next_delay(&key);
        debug!(queue = %self.name, delay_ms = delay.as_millis() as u64, "Requeue with backoff");
        self.add_after(key, delay);
    }

    /// Stop tracking failures for a key.
    pub fn forget(&self, key: &K) {
        self.limiter.forget(key);
    }

    /// How many rate-limited requeues the key has had since it was last forgotten.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.limiter.num_requeues(key)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down;
    /// keys still queued at that point are discarded.
    ///
    /// Every key returned must be passed to [`done`](Self::done).
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_deadline = {
                let mut state = self.state.lock();
                state.promote_ready(Instant::now());
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.next_deadline()
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release a key taken with [`get`](Self::get). If it was re-added in
    /// the meantime it goes back on the queue.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.state.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_waiters();
        }
    }

    /// Number of keys ready to be handed out.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when nothing is queued, in flight or waiting.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.processing.is_empty() && state.deadlines.is_empty()
    }

    /// True when nothing is ready or in flight. Keys may still be waiting
    /// on a deadline.
    pub fn is_quiet(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.processing.is_empty()
    }

    /// Wake all waiting workers and make further `get` calls return `None`.
    pub fn shut_down(&self) {
        {
            let mut state = self.state.lock();
            state.shutting_down = true;
            state.queue.clear();
            state.waiting.clear();
            state.deadlines.clear();
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }
}
