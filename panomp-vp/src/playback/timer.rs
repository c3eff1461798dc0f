//! Timer service abstraction
//!
//! The engine needs two kinds of timers: a single-shot abort timeout per
//! in-flight request and fixed-interval ticks (alignment polling and the
//! auto-quality loop). Firing is delivered through
//! [`Engine::on_timer`](crate::Engine::on_timer); ids of cancelled timers that
//! still arrive are ignored by the engine.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Handle of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Cancellable single-shot and fixed-interval timers on a shared clock
pub trait TimerService {
    /// Fire once after `delay`
    fn schedule_once(&mut self, delay: Duration) -> TimerId;

    /// Fire every `period`, first firing one period from now
    fn schedule_interval(&mut self, period: Duration) -> TimerId;

    /// Cancel a timer; unknown or already-fired ids are ignored
    fn cancel(&mut self, id: TimerId);
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    id: TimerId,
    period_ms: Option<u64>,
}

/// Deterministic virtual-clock timers
///
/// Time only moves when the owner calls [`ManualTimers::pop_due`] or
/// [`ManualTimers::advance_to`]. Timers due at the same instant fire in
/// scheduling order.
#[derive(Debug, Default)]
pub struct ManualTimers {
    now_ms: u64,
    next_id: u64,
    next_seq: u64,
    queue: BTreeMap<(u64, u64), PendingTimer>,
    keys: HashMap<TimerId, (u64, u64)>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms)
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Number of armed timers
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.keys.contains_key(&id)
    }

    /// Deadline of the earliest armed timer
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop the earliest timer due at or before `until_ms`
    ///
    /// Moves the clock to the timer's deadline. Interval timers are re-armed
    /// one period later before being returned.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<TimerId> {
        let (&key, _) = self.queue.iter().next()?;
        if key.0 > until_ms {
            return None;
        }

        let timer = self.queue.remove(&key)?;
        self.keys.remove(&timer.id);
        self.now_ms = self.now_ms.max(key.0);

        if let Some(period) = timer.period_ms {
            self.insert(timer.id, key.0 + period, Some(period));
        }

        Some(timer.id)
    }

    /// Move the clock forward without firing anything
    pub fn advance_to(&mut self, ms: u64) {
        self.now_ms = self.now_ms.max(ms);
    }

    fn insert(&mut self, id: TimerId, deadline: u64, period_ms: Option<u64>) {
        let key = (deadline, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, PendingTimer { id, period_ms });
        self.keys.insert(id, key);
    }

    fn allocate(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId(self.next_id)
    }
}

impl TimerService for ManualTimers {
    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        let id = self.allocate();
        let deadline = self.now_ms + delay.as_millis() as u64;
        self.insert(id, deadline, None);
        id
    }

    fn schedule_interval(&mut self, period: Duration) -> TimerId {
        let id = self.allocate();
        let period_ms = (period.as_millis() as u64).max(1);
        self.insert(id, self.now_ms + period_ms, Some(period_ms));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(key) = self.keys.remove(&id) {
            self.queue.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_shot_fires_once() {
        let mut timers = ManualTimers::new();
        let id = timers.schedule_once(Duration::from_millis(100));

        assert_eq!(timers.pop_due(99), None);
        assert_eq!(timers.pop_due(100), Some(id));
        assert_eq!(timers.now_ms(), 100);
        assert_eq!(timers.pop_due(10_000), None);
        assert!(!timers.is_armed(id));
    }

    #[test]
    fn test_interval_rearms() {
        let mut timers = ManualTimers::new();
        let id = timers.schedule_interval(Duration::from_millis(500));

        let mut fired = Vec::new();
        while let Some(t) = timers.pop_due(1_600) {
            assert_eq!(t, id);
            fired.push(timers.now_ms());
        }
        assert_eq!(fired, vec![500, 1000, 1500]);
        assert_eq!(timers.next_deadline_ms(), Some(2000));
    }

    #[test]
    fn test_cancel() {
        let mut timers = ManualTimers::new();
        let a = timers.schedule_once(Duration::from_millis(10));
        let b = timers.schedule_interval(Duration::from_millis(10));
        timers.cancel(a);
        timers.cancel(b);
        timers.cancel(TimerId(999));
        assert_eq!(timers.pending(), 0);
        assert_eq!(timers.pop_due(1_000), None);
    }

    #[test]
    fn test_same_deadline_fires_in_schedule_order() {
        let mut timers = ManualTimers::new();
        let a = timers.schedule_once(Duration::from_millis(20));
        let b = timers.schedule_once(Duration::from_millis(20));
        assert_eq!(timers.pop_due(20), Some(a));
        assert_eq!(timers.pop_due(20), Some(b));
    }
}
