// src/ready/marker.rs

//! Readiness markers.
//!
//! Large model output is written incrementally; the model drops a small
//! companion file once an output is complete (`wrfout_d01_*` is announced by
//! `wrfoutReady_d01_*`). Waiting on the marker avoids handing a half-written
//! artifact to the next step.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::{ReadinessWaiter, WaitSpec};

static DEFAULT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"wrf(out)_d01").expect("default marker pattern is valid"));

const DEFAULT_REPLACEMENT: &str = "wrf${1}Ready_d01";

/// Stability budget when an artifact is its own marker.
const SELF_MARKED_STABLE: Duration = Duration::from_secs(180);
const MARKER_TICK: Duration = Duration::from_secs(5);

/// Name rule mapping an artifact path to its marker path.
#[derive(Debug, Clone)]
pub struct MarkerRule {
    pattern: Regex,
    replacement: String,
}

impl Default for MarkerRule {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.clone(),
            replacement: DEFAULT_REPLACEMENT.to_string(),
        }
    }
}

impl MarkerRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// Marker for `artifact`; the artifact itself when the rule does not match.
    pub fn marker_for(&self, artifact: &Path) -> PathBuf {
        let text = artifact.to_string_lossy();
        PathBuf::from(
            self.pattern
                .replace(&text, self.replacement.as_str())
                .into_owned(),
        )
    }
}

/// An artifact another step produces, with its marker and cached readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub marker: PathBuf,
    ready: bool,
}

impl ArtifactFile {
    pub fn new(path: impl Into<PathBuf>, rule: &MarkerRule) -> Self {
        let path = path.into();
        let marker = rule.marker_for(&path);
        Self {
            path,
            marker,
            ready: false,
        }
    }

    pub fn is_self_marked(&self) -> bool {
        self.path == self.marker
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Wait until the artifact may be read.
    ///
    /// A self-marked artifact must appear within `appear` and then stop
    /// changing. Otherwise the marker only has to appear; `ready` is its
    /// stability budget, unused since a marker is written in one go.
    pub fn wait_ready(&mut self, waiter: &ReadinessWaiter, appear: Duration, ready: Duration) -> bool {
        if self.ready {
            return true;
        }

        let spec = if self.is_self_marked() {
            WaitSpec {
                max_exist: appear,
                max_stable: SELF_MARKED_STABLE,
                tick: MARKER_TICK,
                min_size: 0,
                skip_stability: false,
            }
        } else {
            WaitSpec {
                max_exist: appear,
                max_stable: ready,
                tick: MARKER_TICK,
                min_size: 0,
                skip_stability: true,
            }
        };

        self.ready = waiter.wait_ready("artifact", &self.marker, &spec);
        self.ready
    }
}
