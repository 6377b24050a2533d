//! Scheduled slot keys.
//!
//! Slot `n` of a task is the fire expected at `started + n * interval`. A
//! fire is mapped to the nearest slot, so timer jitter of up to half an
//! interval in either direction still lands on the intended slot. A second
//! fire for a slot that already started is a duplicate delivery and is
//! dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct SlotTracker {
    state: Mutex<SlotState>,
}

#[derive(Debug)]
struct SlotState {
    started: Instant,
    last_started: HashMap<String, u64>,
}

impl SlotTracker {
    #[must_use]
    pub fn new(started: Instant) -> Self {
        Self {
            state: Mutex::new(SlotState {
                started,
                last_started: HashMap::new(),
            }),
        }
    }

    /// Moves slot 0 to `started` and forgets every claimed slot.
    pub fn restart(&self, started: Instant) {
        let mut state = self.state.lock();
        state.started = started;
        state.last_started.clear();
    }

    #[must_use]
    pub fn origin(&self) -> Instant {
        self.state.lock().started
    }

    #[must_use]
    pub fn slot_index(&self, now: Instant, interval: Duration) -> u64 {
        index_since(self.origin(), now, interval)
    }

    #[must_use]
    pub fn slot_key(name: &str, index: u64) -> String {
        format!("{name}@{index}")
    }

    /// Claims the slot for `now`. Returns `None` if it was already claimed.
    pub fn claim(&self, name: &str, now: Instant, interval: Duration) -> Option<String> {
        let mut state = self.state.lock();
        let index = index_since(state.started, now, interval);
        match state.last_started.get(name) {
            Some(&previous) if previous >= index => None,
            _ => {
                state.last_started.insert(name.to_string(), index);
                Some(Self::slot_key(name, index))
            }
        }
    }
}

fn index_since(started: Instant, now: Instant, interval: Duration) -> u64 {
    let elapsed = now.saturating_duration_since(started).as_secs_f64();
    let interval = interval.as_secs_f64().max(f64::EPSILON);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = (elapsed / interval).round() as u64;
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_rounds_jittered_fires() {
        let start = Instant::now();
        let tracker = SlotTracker::new(start);
        let interval = Duration::from_secs(60);

        assert_eq!(tracker.slot_index(start, interval), 0);
        assert_eq!(tracker.slot_index(start + Duration::from_secs(58), interval), 1);
        assert_eq!(tracker.slot_index(start + Duration::from_secs(62), interval), 1);
        assert_eq!(tracker.slot_index(start + Duration::from_secs(121), interval), 2);
    }

    #[test]
    fn test_duplicate_fire_is_dropped() {
        let start = Instant::now();
        let tracker = SlotTracker::new(start);
        let interval = Duration::from_secs(30);

        assert_eq!(tracker.claim("entry", start, interval).as_deref(), Some("entry@0"));
        assert_eq!(tracker.claim("entry", start + Duration::from_secs(2), interval), None);
        // Other tasks have their own slots.
        assert!(tracker.claim("valuation", start, interval).is_some());
        assert_eq!(
            tracker.claim("entry", start + Duration::from_secs(31), interval).as_deref(),
            Some("entry@1")
        );
    }

    #[test]
    fn test_restart_moves_slot_zero() {
        let built = Instant::now();
        let tracker = SlotTracker::new(built);
        let interval = Duration::from_secs(60);

        // Started 40s after construction: the first fire must still be slot 0.
        let started = built + Duration::from_secs(40);
        tracker.restart(started);
        assert_eq!(tracker.origin(), started);
        assert_eq!(tracker.claim("entry", started, interval).as_deref(), Some("entry@0"));
        assert_eq!(
            tracker.claim("entry", started + Duration::from_secs(59), interval).as_deref(),
            Some("entry@1")
        );

        // A restart forgets earlier claims.
        tracker.restart(started + Duration::from_secs(600));
        assert_eq!(
            tracker
                .claim("entry", started + Duration::from_secs(600), interval)
                .as_deref(),
            Some("entry@0")
        );
    }
}
