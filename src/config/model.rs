// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::job::WaitTiming;
use crate::ready::{MarkerRule, WaitSpec};
use crate::scheduler::SlurmSettings;
use crate::types::{ExecMode, InputMode, StatusStrategy};

/// Configuration file as deserialized, before validation.
///
/// ```toml
/// [run]
/// work_root = "/scratch/cycles"
/// status = "sentinel"
///
/// [program.real]
/// executable = "/opt/wrf/real.exe"
/// nprocs = 48
/// cores_per_node = 24
/// walltime = 20
/// retry = 2
///
/// [[case]]
/// number = 3
/// domain = "d01"
/// start = "2024-05-01T18:00:00"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub wait: WaitSection,

    #[serde(default)]
    pub marker: MarkerSection,

    /// Keyed by program (step) name, e.g. `"real"`, `"news3dvar"`.
    #[serde(default)]
    pub program: BTreeMap<String, ProgramConfig>,

    #[serde(default)]
    pub case: Vec<CaseConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub run: RunSection,
    pub scheduler: SchedulerSection,
    pub wait: WaitSection,
    pub marker: MarkerRule,
    pub program: BTreeMap<String, ProgramConfig>,
    pub case: Vec<CaseConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, marker: MarkerRule) -> Self {
        Self {
            run: raw.run,
            scheduler: raw.scheduler,
            wait: raw.wait,
            marker,
            program: raw.program,
            case: raw.case,
        }
    }
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    #[serde(default = "default_run_name")]
    pub name: String,

    /// Root of all case directories.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// How job status is determined for batch jobs.
    #[serde(default)]
    pub status: StatusStrategy,
}

fn default_run_name() -> String {
    "cyclerun".to_string()
}

fn default_work_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            name: default_run_name(),
            work_root: default_work_root(),
            status: StatusStrategy::default(),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    #[serde(default = "default_sbatch")]
    pub sbatch: String,
    #[serde(default = "default_squeue")]
    pub squeue: String,
    #[serde(default = "default_sacct")]
    pub sacct: String,
    #[serde(default = "default_partition")]
    pub partition: String,
    #[serde(default = "default_script_ext")]
    pub script_ext: String,
    #[serde(default = "default_launcher")]
    pub launcher: String,
    #[serde(default)]
    pub preamble: Vec<String>,
    /// Seconds to wait before repeating a query that hit a socket timeout.
    #[serde(default = "default_query_backoff")]
    pub query_backoff: u64,
}

fn default_sbatch() -> String {
    "sbatch".to_string()
}
fn default_squeue() -> String {
    "squeue".to_string()
}
fn default_sacct() -> String {
    "sacct".to_string()
}
fn default_partition() -> String {
    "batch".to_string()
}
fn default_script_ext() -> String {
    "slurm".to_string()
}
fn default_launcher() -> String {
    "srun".to_string()
}
fn default_query_backoff() -> u64 {
    10
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            sbatch: default_sbatch(),
            squeue: default_squeue(),
            sacct: default_sacct(),
            partition: default_partition(),
            script_ext: default_script_ext(),
            launcher: default_launcher(),
            preamble: Vec::new(),
            query_backoff: default_query_backoff(),
        }
    }
}

impl SchedulerSection {
    pub fn settings(&self) -> SlurmSettings {
        SlurmSettings {
            sbatch: self.sbatch.clone(),
            squeue: self.squeue.clone(),
            sacct: self.sacct.clone(),
            default_partition: self.partition.clone(),
            script_ext: self.script_ext.clone(),
            launcher: self.launcher.clone(),
            preamble: self.preamble.clone(),
            query_backoff: Duration::from_secs(self.query_backoff),
        }
    }
}

/// `[wait]` section. All values in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitSection {
    #[serde(default = "default_poll")]
    pub poll: u64,
    #[serde(default = "default_start_progress")]
    pub start_progress: u64,
    #[serde(default = "default_finish_progress")]
    pub finish_progress: u64,
    /// How long a job may stay queued before it counts as timed out.
    #[serde(default = "default_max_start")]
    pub max_start: u64,
    #[serde(default = "default_file_exist")]
    pub file_exist: u64,
    #[serde(default = "default_file_stable")]
    pub file_stable: u64,
    #[serde(default = "default_file_tick")]
    pub file_tick: u64,
}

fn default_poll() -> u64 {
    5
}
fn default_start_progress() -> u64 {
    20
}
fn default_finish_progress() -> u64 {
    10
}
fn default_max_start() -> u64 {
    10800
}
fn default_file_exist() -> u64 {
    10800
}
fn default_file_stable() -> u64 {
    3600
}
fn default_file_tick() -> u64 {
    10
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            poll: default_poll(),
            start_progress: default_start_progress(),
            finish_progress: default_finish_progress(),
            max_start: default_max_start(),
            file_exist: default_file_exist(),
            file_stable: default_file_stable(),
            file_tick: default_file_tick(),
        }
    }
}

impl WaitSection {
    pub fn timing(&self) -> WaitTiming {
        WaitTiming {
            poll: Duration::from_secs(self.poll),
            start_every: Duration::from_secs(self.start_progress),
            finish_every: Duration::from_secs(self.finish_progress),
        }
    }

    pub fn max_start(&self) -> Duration {
        Duration::from_secs(self.max_start)
    }

    /// Readiness budgets for `target`, falling back to this section.
    pub fn file_spec(&self, target: &WaitTarget) -> WaitSpec {
        WaitSpec {
            max_exist: Duration::from_secs(target.max_exist.unwrap_or(self.file_exist)),
            max_stable: Duration::from_secs(target.max_stable.unwrap_or(self.file_stable)),
            tick: Duration::from_secs(self.file_tick),
            min_size: target.min_size,
            skip_stability: target.skip_stability,
        }
    }
}

/// `[marker]` section: how an artifact's ready marker is named.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerSection {
    #[serde(default = "default_marker_pattern")]
    pub pattern: String,
    #[serde(default = "default_marker_replacement")]
    pub replacement: String,
}

fn default_marker_pattern() -> String {
    "wrf(out)_d01".to_string()
}

fn default_marker_replacement() -> String {
    "wrf${1}Ready_d01".to_string()
}

impl Default for MarkerSection {
    fn default() -> Self {
        Self {
            pattern: default_marker_pattern(),
            replacement: default_marker_replacement(),
        }
    }
}

/// `[program.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramConfig {
    pub executable: PathBuf,

    /// Input file name inside the working directory (usually a namelist).
    #[serde(default)]
    pub input: Option<String>,

    #[serde(default)]
    pub input_mode: InputMode,

    /// Output file name; defaults to `<program><n>_<HHMM>.output`.
    #[serde(default)]
    pub output: Option<String>,

    #[serde(default = "default_one")]
    pub nprocs: u32,

    #[serde(default = "default_one")]
    pub cores_per_node: u32,

    /// Wall time in minutes; also the finish-wait deadline.
    #[serde(default = "default_walltime")]
    pub walltime: u32,

    #[serde(default)]
    pub partition: Option<String>,

    #[serde(default)]
    pub exclusive: bool,

    /// Total tries, the first submission included.
    #[serde(default = "default_one")]
    pub retry: u32,

    /// Highest ensemble member index; members run as `0..=ensemble`.
    #[serde(default)]
    pub ensemble: Option<u32>,

    #[serde(default)]
    pub mode: ExecMode,

    #[serde(default)]
    pub cleanup_script: bool,

    /// File copied into each working directory under the `input` name.
    #[serde(default)]
    pub template: Option<PathBuf>,

    /// Files that must be ready before the program is submitted.
    #[serde(default)]
    pub wait_for: Vec<WaitTarget>,
}

fn default_one() -> u32 {
    1
}

fn default_walltime() -> u32 {
    30
}

/// One entry of `wait_for`.
///
/// `path` may use `{case_dir}`, `{work_root}`, `{date}` (`YYYYMMDD`),
/// `{time}` (`HHMM`) and `{member}`. Relative paths are taken from the
/// case directory.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WaitTarget {
    pub path: String,

    /// Expand `{member}` over `0..=members` and wait for the whole set.
    #[serde(default)]
    pub members: Option<u32>,

    /// Wait on the readiness marker instead of the file itself.
    #[serde(default)]
    pub marker: bool,

    #[serde(default)]
    pub min_size: u64,

    #[serde(default)]
    pub max_exist: Option<u64>,

    #[serde(default)]
    pub max_stable: Option<u64>,

    #[serde(default)]
    pub skip_stability: bool,
}

/// `[[case]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseConfig {
    /// Pipeline shape: 1-7 or 27.
    pub number: u32,

    pub domain: String,

    pub start: NaiveDateTime,

    /// Nested domains reuse the parent's `ungrib` output.
    #[serde(default)]
    pub nested: bool,

    /// Steps to run; defaults to every step of the shape that has a
    /// `[program.<name>]` section.
    #[serde(default)]
    pub programs: Option<Vec<String>>,
}

impl CaseConfig {
    /// Display name, e.g. `case-3_d01`.
    pub fn name(&self) -> String {
        format!("case-{}_{}", self.number, self.domain)
    }
}
