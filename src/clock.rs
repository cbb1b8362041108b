//! Master clock
//!
//! Every component that needs time takes a [`Clock`] handle instead of
//! reading real time directly, so pacing and timeout logic is testable
//! against [`ManualClock`].

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window, in nanoseconds, that `sleep_until` spins instead of sleeping.
const SPIN_WINDOW_NS: i64 = 2_000_000;

/// Monotonic, non-adjustable time source. All timestamps in the system are
/// nanoseconds against one of these.
pub trait Clock: Send + Sync {
    /// Nanoseconds since an implementation-defined boot-relative epoch.
    /// Monotonic: never decreases, unaffected by wall-clock adjustments.
    fn now_ns(&self) -> i64;

    fn elapsed_ns(&self, start_ns: i64) -> i64 {
        self.now_ns() - start_ns
    }

    fn sleep_for(&self, duration: Duration);

    /// Precise absolute sleep: sleeps most of the interval, then spins the
    /// final ~2 ms. Returns immediately if the target is already past.
    fn sleep_until(&self, target_ns: i64);

    /// Clock resolution in nanoseconds
    fn resolution_ns(&self) -> i64 {
        1
    }
}

/// Clock statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockStats {
    pub now_calls: u64,
    pub uptime_ns: i64,
    pub resolution_ns: i64,
}

/// Production clock backed by `std::time::Instant` (monotonic on all
/// supported platforms; wall-clock steps do not affect it).
pub struct MonotonicClock {
    epoch: Instant,
    now_calls: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            now_calls: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> ClockStats {
        ClockStats {
            now_calls: self.now_calls.load(Ordering::Relaxed),
            uptime_ns: self.epoch.elapsed().as_nanos() as i64,
            resolution_ns: self.resolution_ns(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> i64 {
        self.now_calls.fetch_add(1, Ordering::Relaxed);
        self.epoch.elapsed().as_nanos() as i64
    }

    fn sleep_for(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn sleep_until(&self, target_ns: i64) {
        let remaining = target_ns - self.now_ns();
        if remaining <= 0 {
            return;
        }
        if remaining > SPIN_WINDOW_NS {
            std::thread::sleep(Duration::from_nanos((remaining - SPIN_WINDOW_NS) as u64));
        }
        while self.now_ns() < target_ns {
            std::hint::spin_loop();
        }
    }
}

/// Test clock with settable time. `sleep_*` advances time instead of
/// blocking and records each requested wakeup.
pub struct ManualClock {
    now_ns: AtomicI64,
    sleeps: Mutex<Vec<i64>>,
}

impl ManualClock {
    pub fn new(start_ns: i64) -> Self {
        Self {
            now_ns: AtomicI64::new(start_ns),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, delta_ns: i64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }

    pub fn set(&self, now_ns: i64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    /// Absolute targets passed to `sleep_until`, in call order
    pub fn recorded_sleeps(&self) -> Vec<i64> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> i64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn sleep_for(&self, duration: Duration) {
        self.advance(duration.as_nanos() as i64);
    }

    fn sleep_until(&self, target_ns: i64) {
        self.sleeps.lock().unwrap().push(target_ns);
        let now = self.now_ns();
        if target_ns > now {
            self.now_ns.store(target_ns, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonicity() {
        let clock = MonotonicClock::new();
        let t1 = clock.now_ns();
        let t2 = clock.now_ns();
        assert!(t2 >= t1);
    }

    #[test]
    fn sleep_until_past_target_returns() {
        let clock = MonotonicClock::new();
        let now = clock.now_ns();
        let before = Instant::now();
        clock.sleep_until(now - 1_000_000);
        assert!(before.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn sleep_until_reaches_target() {
        let clock = MonotonicClock::new();
        let target = clock.now_ns() + 5_000_000;
        clock.sleep_until(target);
        assert!(clock.now_ns() >= target);
    }

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new(0);
        clock.sleep_until(1_000);
        assert_eq!(clock.now_ns(), 1_000);
        clock.sleep_for(Duration::from_nanos(500));
        assert_eq!(clock.now_ns(), 1_500);
        // Sleeping to a past target does not rewind
        clock.sleep_until(100);
        assert_eq!(clock.now_ns(), 1_500);
        assert_eq!(clock.recorded_sleeps(), vec![1_000, 100]);
    }

    #[test]
    fn now_call_accounting() {
        let clock = MonotonicClock::new();
        let _ = clock.now_ns();
        let _ = clock.now_ns();
        assert!(clock.stats().now_calls >= 2);
    }
}
