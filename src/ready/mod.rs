// src/ready/mod.rs

//! Waiting for files produced by another process.
//!
//! There is no notification from the writer, so readiness is decided by
//! polling:
//! - the file must exist;
//! - if it was modified recently (within `24 × tick`), its mtime must stay
//!   unchanged across two consecutive polls, and its size must reach
//!   `min_size` when one is given.
//!
//! [`marker`] covers artifacts that announce completion through a companion
//! "ready" file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::context::{KeepWaiting, RunContext};
use crate::errors::ReadyError;
use crate::fs::FileSystem;

pub mod marker;

pub use marker::{ArtifactFile, MarkerRule};

/// Files modified longer ago than this many ticks are taken as finished.
const OLD_FILE_TICKS: u32 = 24;

static MEMBER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\d{1,3}$").expect("member suffix pattern is valid"));

/// Budgets of one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    /// How long to wait for the file(s) to appear.
    pub max_exist: Duration,
    /// How long to wait for recent file(s) to stop changing.
    pub max_stable: Duration,
    pub tick: Duration,
    /// Minimum size in bytes, `0` for no requirement.
    pub min_size: u64,
    /// Only wait for existence.
    pub skip_stability: bool,
}

impl Default for WaitSpec {
    fn default() -> Self {
        Self {
            max_exist: Duration::from_secs(10800),
            max_stable: Duration::from_secs(3600),
            tick: Duration::from_secs(10),
            min_size: 0,
            skip_stability: false,
        }
    }
}

impl WaitSpec {
    fn old_after(&self) -> Duration {
        self.tick * OLD_FILE_TICKS
    }
}

/// Base name of the first file and its directory with a trailing member
/// suffix `_<n>` shown as `_*`, for log lines about a set of files.
pub fn set_label(first: &Path) -> (String, String) {
    let base = first
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = first
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    (base, MEMBER_SUFFIX.replace(&dir, "_*").into_owned())
}

#[derive(Debug, Clone)]
pub struct ReadinessWaiter {
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    keep_waiting: KeepWaiting,
}

impl ReadinessWaiter {
    pub fn new(fs: Arc<dyn FileSystem>, clock: Arc<dyn Clock>, keep_waiting: KeepWaiting) -> Self {
        Self {
            fs,
            clock,
            keep_waiting,
        }
    }

    pub fn from_context(ctx: &RunContext) -> Self {
        Self::new(ctx.fs_arc(), ctx.clock_arc(), ctx.keep_waiting().clone())
    }

    fn keep_going(&self) -> bool {
        self.keep_waiting.is_set()
    }

    fn is_recent(&self, mtime: Option<SystemTime>, spec: &WaitSpec) -> bool {
        // An unreadable mtime is treated as recent so it gets polled.
        let Some(mtime) = mtime else { return true };
        let age = self
            .clock
            .now()
            .duration_since(mtime)
            .unwrap_or(Duration::ZERO);
        age < spec.old_after()
    }

    fn big_enough(&self, path: &Path, spec: &WaitSpec) -> bool {
        spec.min_size == 0 || self.fs.len(path).map(|n| n >= spec.min_size).unwrap_or(false)
    }

    /// Wait until `path` exists and has stopped changing.
    pub fn wait_ready(&self, label: &str, path: &Path, spec: &WaitSpec) -> bool {
        debug!(job = label, path = ?path, "waiting for file");

        let mut waited = Duration::ZERO;
        while !self.fs.exists(path) {
            if waited >= spec.max_exist || !self.keep_going() {
                warn!(
                    job = label,
                    path = ?path,
                    "waiting for file exceeded {} seconds",
                    spec.max_exist.as_secs()
                );
                return false;
            }
            self.clock.sleep(spec.tick);
            waited += spec.tick;
        }

        if spec.skip_stability {
            return true;
        }

        let mut last = self.fs.modified(path).ok();
        if !self.is_recent(last, spec) {
            debug!(path = ?path, "file is old, no stability check");
            return true;
        }

        let mut waited = Duration::ZERO;
        while waited < spec.max_stable && self.keep_going() {
            self.clock.sleep(spec.tick);
            waited += spec.tick;

            let current = self.fs.modified(path).ok();
            if current.is_some() && current == last {
                if !self.big_enough(path, spec) {
                    debug!(
                        path = ?path,
                        waited_secs = waited.as_secs(),
                        "file is still too small, keep waiting"
                    );
                    continue;
                }
                info!(path = ?path, waited_secs = waited.as_secs(), "file is now ready");
                return true;
            }

            debug!(path = ?path, waited_secs = waited.as_secs(), "file is actively changing");
            last = current;
        }

        warn!(
            job = label,
            path = ?path,
            "waiting for file to be ready exceeded {} seconds",
            spec.max_stable.as_secs()
        );
        false
    }

    /// Wait for a homogeneous set of files; returns how many are ready.
    ///
    /// On a stability timeout the count is the files that were already old
    /// plus the recent files that were stable on the last poll. Callers
    /// compare it with `paths.len()`.
    pub fn wait_ready_all(&self, label: &str, paths: &[PathBuf], spec: &WaitSpec) -> usize {
        let Some(first) = paths.first() else {
            return 0;
        };
        let (base, dir) = set_label(first);

        let mut waited = Duration::ZERO;
        loop {
            let missing: Vec<usize> = paths
                .iter()
                .enumerate()
                .filter(|(_, p)| !self.fs.exists(p))
                .map(|(i, _)| i)
                .collect();
            if missing.is_empty() {
                break;
            }

            let present = paths.len() - missing.len();
            if waited >= spec.max_exist || !self.keep_going() {
                warn!(
                    job = label,
                    present,
                    missing = ?missing,
                    "waiting for {base} from {dir} exceeded {} seconds",
                    spec.max_exist.as_secs()
                );
                return present;
            }

            debug!(
                exists = present,
                miss = ?missing,
                waited_secs = waited.as_secs(),
                "checking {base} from {dir}"
            );
            self.clock.sleep(spec.tick);
            waited += spec.tick;
        }

        if spec.skip_stability {
            return paths.len();
        }

        let recent: Vec<&PathBuf> = paths
            .iter()
            .filter(|p| self.is_recent(self.fs.modified(p).ok(), spec))
            .collect();
        if recent.is_empty() {
            debug!("all {base} in {dir} are old, no stability check");
            return paths.len();
        }
        let old = paths.len() - recent.len();

        let mtimes = |files: &[&PathBuf]| -> Vec<Option<SystemTime>> {
            files.iter().map(|p| self.fs.modified(p).ok()).collect()
        };
        let mut lasts = mtimes(&recent);
        let mut readys = vec![false; recent.len()];

        let mut waited = Duration::ZERO;
        while waited < spec.max_stable && self.keep_going() {
            self.clock.sleep(spec.tick);
            waited += spec.tick;

            let currents = mtimes(&recent);
            readys = lasts
                .iter()
                .zip(&currents)
                .map(|(last, current)| current.is_some() && last == current)
                .collect();

            if readys.iter().all(|r| *r) {
                if spec.min_size > 0 {
                    readys = recent.iter().map(|p| self.big_enough(p, spec)).collect();
                    if !readys.iter().all(|r| *r) {
                        let small: Vec<usize> = unready_indices(&readys);
                        debug!(
                            small = ?small,
                            waited_secs = waited.as_secs(),
                            "{base} in {dir} not large enough, keep waiting"
                        );
                        continue;
                    }
                }
                info!(
                    count = paths.len(),
                    waited_secs = waited.as_secs(),
                    "files {base} in {dir} are now stable"
                );
                return paths.len();
            }

            debug!(
                changing = ?unready_indices(&readys),
                waited_secs = waited.as_secs(),
                "{base} in {dir} actively changing"
            );
            lasts = currents;
        }

        let stable = readys.iter().filter(|r| **r).count();
        for (path, _) in recent.iter().zip(&readys).filter(|(_, r)| !**r) {
            warn!(
                job = label,
                path = ?path,
                "waiting for file to be ready exceeded {} seconds",
                spec.max_stable.as_secs()
            );
        }
        old + stable
    }

    /// Like [`wait_ready_all`](Self::wait_ready_all), but anything short of
    /// the full set is an error.
    pub fn require_all(&self, label: &str, paths: &[PathBuf], spec: &WaitSpec) -> Result<(), ReadyError> {
        let ready = self.wait_ready_all(label, paths, spec);
        if ready == paths.len() {
            return Ok(());
        }
        let path = paths
            .iter()
            .find(|p| !self.fs.exists(p))
            .or_else(|| paths.first())
            .cloned()
            .unwrap_or_default();
        Err(ReadyError::FileNotReady {
            path,
            ready,
            expected: paths.len(),
        })
    }
}

fn unready_indices(readys: &[bool]) -> Vec<usize> {
    readys
        .iter()
        .enumerate()
        .filter(|(_, r)| !**r)
        .map(|(i, _)| i)
        .collect()
}
