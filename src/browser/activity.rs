//! In-flight request tracking for a single page.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Counts outstanding network requests of one page and remembers when the
/// count last changed.
///
/// Requests are keyed by the engine's request id, so redirects (which reuse
/// the id) and duplicate finish events do not skew the count.
#[derive(Debug)]
pub struct NetworkActivity {
    state: Mutex<ActivityState>,
}

#[derive(Debug)]
struct ActivityState {
    in_flight: HashSet<String>,
    last_change: Instant,
    total_started: usize,
}

/// Point-in-time view of [`NetworkActivity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub in_flight: usize,
    pub quiet_for: Duration,
    pub total_started: usize,
}

impl Default for NetworkActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkActivity {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ActivityState {
                in_flight: HashSet::new(),
                last_change: Instant::now(),
                total_started: 0,
            }),
        }
    }

    pub fn request_started(&self, request_id: impl Into<String>) {
        let mut state = self.lock();
        if state.in_flight.insert(request_id.into()) {
            state.total_started += 1;
            state.last_change = Instant::now();
        }
    }

    pub fn request_finished(&self, request_id: &str) {
        let mut state = self.lock();
        if state.in_flight.remove(request_id) {
            state.last_change = Instant::now();
        }
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        let state = self.lock();
        ActivitySnapshot {
            in_flight: state.in_flight.len(),
            quiet_for: state.last_change.elapsed(),
            total_started: state.total_started,
        }
    }

    /// True when at most `max_inflight` requests are pending and nothing has
    /// changed for `window`.
    pub fn is_quiescent(&self, max_inflight: usize, window: Duration) -> bool {
        let snapshot = self.snapshot();
        snapshot.in_flight <= max_inflight && snapshot.quiet_for >= window
    }

    fn lock(&self) -> MutexGuard<'_, ActivityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_start_is_counted_once() {
        let activity = NetworkActivity::new();
        activity.request_started("1");
        activity.request_started("1");
        activity.request_started("2");

        let snapshot = activity.snapshot();
        assert_eq!(snapshot.in_flight, 2);
        assert_eq!(snapshot.total_started, 2);
    }

    #[test]
    fn unknown_finish_is_ignored() {
        let activity = NetworkActivity::new();
        activity.request_started("1");
        activity.request_finished("does-not-exist");
        assert_eq!(activity.snapshot().in_flight, 1);

        activity.request_finished("1");
        activity.request_finished("1");
        assert_eq!(activity.snapshot().in_flight, 0);
    }

    #[test]
    fn quiescence_requires_window_to_elapse() {
        let activity = NetworkActivity::new();
        activity.request_started("a");
        assert!(!activity.is_quiescent(0, Duration::ZERO));
        assert!(activity.is_quiescent(1, Duration::ZERO));
        assert!(!activity.is_quiescent(1, Duration::from_secs(60)));
    }

    #[test]
    fn quiet_period_grows_without_events() {
        let activity = NetworkActivity::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(activity.snapshot().quiet_for >= Duration::from_millis(20));
        assert!(activity.is_quiescent(2, Duration::from_millis(10)));
    }
}
