// src/clock.rs

//! Time source boundary.
//!
//! Every blocking wait in the crate sleeps through a [`Clock`], so the polling
//! loops can be driven by [`ManualClock`] in tests without real sleeps.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> SystemTime;
    fn sleep(&self, duration: Duration);
}

/// Wall clock with real `thread::sleep`.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

type SleepHook = Box<dyn Fn(SystemTime) + Send + Sync>;

/// Virtual clock: `sleep` advances time instantly.
///
/// An optional hook runs after every sleep with the new time, which lets a
/// test change files or scheduler answers between two polls.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
    hook: Arc<Mutex<Option<SleepHook>>>,
}

struct ManualState {
    start: SystemTime,
    now: SystemTime,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState { start, now: start })),
            hook: Arc::new(Mutex::new(None)),
        }
    }

    /// A clock starting at a fixed, recent-looking instant.
    pub fn starting_now() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    pub fn on_sleep(&self, hook: impl Fn(SystemTime) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        let state = self.inner.lock().unwrap();
        state
            .now
            .duration_since(state.start)
            .unwrap_or(Duration::ZERO)
    }
}

impl Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.inner.lock().unwrap().now
    }

    fn sleep(&self, duration: Duration) {
        let now = {
            let mut state = self.inner.lock().unwrap();
            state.now += duration;
            state.now
        };
        // Run the hook without holding the time lock so it may call `now()`.
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::starting_now();
        let t0 = clock.now();
        clock.sleep(Duration::from_secs(5));
        assert_eq!(clock.now(), t0 + Duration::from_secs(5));
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn manual_clock_runs_hook_after_each_sleep() {
        let clock = ManualClock::starting_now();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        clock.on_sleep(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        clock.sleep(Duration::from_secs(1));
        clock.sleep(Duration::from_secs(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
