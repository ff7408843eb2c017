// src/context.rs

//! Process-wide state shared by all cases.
//!
//! There is deliberately no global: one [`RunContext`] is built in
//! `lib::run` and passed by reference to every case thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::fs::{FileSystem, RealFileSystem};

/// Cooperative "keep waiting" flag.
///
/// Clearing it asks every in-flight wait to give up at its next poll. It is
/// coarse by design of the pipeline: used for shutdown, never to cancel a
/// single job.
#[derive(Debug, Clone)]
pub struct KeepWaiting(Arc<AtomicBool>);

impl KeepWaiting {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for KeepWaiting {
    fn default() -> Self {
        Self::new()
    }
}

/// Submission sequence counter shared by all cases.
///
/// Same-named jobs from concurrent cases are told apart in the logs (and,
/// for local jobs, in their sentinel names) by this number.
#[derive(Debug, Clone, Default)]
pub struct SubmissionCounter(Arc<Mutex<u64>>);

impl SubmissionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number (1-based).
    pub fn next(&self) -> u64 {
        // A poisoned counter is still a valid counter.
        let mut serial = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *serial += 1;
        *serial
    }
}

#[derive(Debug)]
pub struct RunContext {
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    keep_waiting: KeepWaiting,
    serial: SubmissionCounter,
}

impl RunContext {
    pub fn new(fs: Arc<dyn FileSystem>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fs,
            clock,
            keep_waiting: KeepWaiting::new(),
            serial: SubmissionCounter::new(),
        }
    }

    /// Context backed by the real filesystem and wall clock.
    pub fn system() -> Self {
        Self::new(Arc::new(RealFileSystem), Arc::new(SystemClock))
    }

    pub fn fs_arc(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    pub fn clock_arc(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn keep_waiting(&self) -> &KeepWaiting {
        &self.keep_waiting
    }

    /// Ask all waits in all cases to stop.
    pub fn cancel(&self) {
        self.keep_waiting.clear();
    }

    pub fn counter(&self) -> &SubmissionCounter {
        &self.serial
    }

    /// Next submission sequence number (1-based).
    pub fn next_serial(&self) -> u64 {
        self.serial.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn serials_are_unique_across_threads() {
        let ctx = RunContext::system();
        let serials: Vec<u64> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| (0..50).map(|_| ctx.next_serial()).collect::<Vec<_>>()))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let unique: HashSet<u64> = serials.iter().copied().collect();
        assert_eq!(unique.len(), 400);
        assert_eq!(serials.iter().max(), Some(&400));
    }

    #[test]
    fn cancel_clears_keep_waiting() {
        let ctx = RunContext::system();
        let flag = ctx.keep_waiting().clone();
        assert!(flag.is_set());
        ctx.cancel();
        assert!(!flag.is_set());
    }
}
