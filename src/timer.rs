//! Timer service used by log endpoints
//!
//! Endpoints only schedule and cancel; whoever drives the event loop calls
//! `fire_due` and hands each returned handle back to the owning endpoint.
//! `TimerQueue` is a deterministic implementation on a caller-supplied
//! monotonic clock, measured as a `Duration` since an arbitrary origin.

use std::collections::HashMap;
use std::time::Duration;

/// Identifies one scheduled timer; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Scheduling primitive consumed by endpoints
pub trait TimerService {
    /// Fire once after `delay`
    fn schedule_once(&mut self, delay: Duration) -> TimerHandle;

    /// Fire every `interval` until cancelled
    fn schedule_periodic(&mut self, interval: Duration) -> TimerHandle;

    /// Disarm a timer; unknown or already-fired handles are ignored
    fn cancel(&mut self, handle: TimerHandle);

    /// Advance the clock to `now` and return the timers that came due
    ///
    /// One-shot timers are cleared as they are returned, periodic ones are
    /// re-armed one interval after `now`.
    fn fire_due(&mut self, now: Duration) -> Vec<TimerHandle>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Duration,
    interval: Option<Duration>,
}

/// Deterministic timer service
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Duration,
    next_id: u64,
    timers: HashMap<TimerHandle, Entry>,
}

impl TimerQueue {
    /// Empty queue with its clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock value
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of armed timers
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Whether `handle` is still armed
    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    /// Earliest deadline among armed timers
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.values().map(|e| e.deadline).min()
    }

    fn insert(&mut self, delay: Duration, interval: Option<Duration>) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.timers.insert(handle, Entry { deadline: self.now + delay, interval });
        handle
    }
}

impl TimerService for TimerQueue {
    fn schedule_once(&mut self, delay: Duration) -> TimerHandle {
        self.insert(delay, None)
    }

    fn schedule_periodic(&mut self, interval: Duration) -> TimerHandle {
        self.insert(interval, Some(interval))
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }

    fn fire_due(&mut self, now: Duration) -> Vec<TimerHandle> {
        self.now = self.now.max(now);

        let mut due: Vec<(Duration, TimerHandle)> = self
            .timers
            .iter()
            .filter(|(_, e)| e.deadline <= self.now)
            .map(|(h, e)| (e.deadline, *h))
            .collect();
        due.sort();

        for (_, handle) in &due {
            let rearm = self.timers.get(handle).and_then(|e| e.interval);
            match rearm {
                Some(interval) => {
                    if let Some(entry) = self.timers.get_mut(handle) {
                        entry.deadline = self.now + interval;
                    }
                }
                None => {
                    self.timers.remove(handle);
                }
            }
        }

        due.into_iter().map(|(_, h)| h).collect()
    }
}
