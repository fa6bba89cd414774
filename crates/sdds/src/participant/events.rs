// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Event timer: a single monotonic min-heap per participant with
//! cancellation tokens, never one thread per timer.
//!
//! Hosts periodic heartbeats, SPDP announcements, lease checks, and
//! deferred ACKNACK responses. A callback returns the delay to its next
//! firing, or `None` to retire itself.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Cancellation token for a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventToken(u64);

/// Event callback; the returned duration reschedules the event.
pub type EventCallback = Box<dyn FnMut() -> Option<Duration> + Send>;

struct TimerState {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    callbacks: HashMap<u64, EventCallback>,
    cancelled: HashSet<u64>,
    next_token: u64,
    running: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    cv: Condvar,
}

/// Ordered timer wheel shared by all built-in and user endpoints of a
/// participant.
pub struct EventTimer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventTimer {
    /// Start the event thread.
    #[must_use]
    pub fn start() -> Self {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                callbacks: HashMap::new(),
                cancelled: HashSet::new(),
                next_token: 1,
                running: true,
            }),
            cv: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("sdds.events".into())
            .spawn(move || run_timer(&thread_shared))
            .ok();

        Self {
            shared,
            thread: Mutex::new(thread),
        }
    }

    /// Schedule a callback after `delay`. The callback reschedules itself
    /// by returning the next delay.
    pub fn schedule(&self, delay: Duration, callback: EventCallback) -> EventToken {
        let mut state = self.shared.state.lock();
        let token = state.next_token;
        state.next_token += 1;
        state.callbacks.insert(token, callback);
        state.heap.push(Reverse((Instant::now() + delay, token)));
        drop(state);
        self.shared.cv.notify_one();
        EventToken(token)
    }

    /// Schedule a fixed-period event.
    pub fn schedule_periodic<F: FnMut() + Send + 'static>(
        &self,
        period: Duration,
        mut callback: F,
    ) -> EventToken {
        self.schedule(
            period,
            Box::new(move || {
                callback();
                Some(period)
            }),
        )
    }

    /// Cancel an event. An in-flight callback finishes but never fires
    /// again.
    pub fn cancel(&self, token: EventToken) {
        let mut state = self.shared.state.lock();
        state.callbacks.remove(&token.0);
        state.cancelled.insert(token.0);
    }

    /// Stop the event thread; outstanding events are dropped.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.running = false;
            state.heap.clear();
            state.callbacks.clear();
        }
        self.shared.cv.notify_all();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer(shared: &TimerShared) {
    let mut state = shared.state.lock();
    while state.running {
        let now = Instant::now();
        match state.heap.peek().copied() {
            Some(Reverse((deadline, token))) if deadline <= now => {
                state.heap.pop();
                if state.cancelled.remove(&token) {
                    continue;
                }
                let Some(mut callback) = state.callbacks.remove(&token) else {
                    continue;
                };
                // Run without the lock so callbacks may schedule/cancel.
                drop(state);
                let next = callback();
                state = shared.state.lock();
                if !state.running {
                    return;
                }
                if state.cancelled.remove(&token) {
                    continue;
                }
                if let Some(delay) = next {
                    state.callbacks.insert(token, callback);
                    state.heap.push(Reverse((Instant::now() + delay, token)));
                }
            }
            Some(Reverse((deadline, _))) => {
                let wait = deadline.saturating_duration_since(now);
                shared.cv.wait_for(&mut state, wait);
            }
            None => {
                shared.cv.wait_for(&mut state, Duration::from_millis(200));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_one_shot_event_fires() {
        let timer = EventTimer::start();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        timer.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                None
            }),
        );
        let deadline = Instant::now() + Duration::from_secs(2);
        while fired.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        // One-shot events never fire twice.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        timer.shutdown();
    }

    #[test]
    fn test_periodic_event_reschedules() {
        let timer = EventTimer::start();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        timer.schedule_periodic(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        while fired.load(Ordering::Relaxed) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(fired.load(Ordering::Relaxed) >= 3);
        timer.shutdown();
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let timer = EventTimer::start();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let token = timer.schedule(
            Duration::from_millis(50),
            Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                None
            }),
        );
        timer.cancel(token);
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::Relaxed), 0);
        timer.shutdown();
    }
}
