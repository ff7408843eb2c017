// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Status of a submitted job as seen from the client side.
///
/// The numeric codes are what operators see in logs and what the ordering
/// of the waiting phases is built on: anything above `Running` is still
/// waiting to start, anything at or below `Done` is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Done,
    /// Every task of the job failed.
    Error,
    /// Some ensemble tasks failed, the rest are done.
    PartialFailure,
    Running,
    Pending,
    /// The job was handed to the scheduler again and has not been resolved yet.
    JustResubmitted,
    Unknown,
}

impl Status {
    pub fn code(self) -> Option<i32> {
        match self {
            Status::Done => Some(0),
            Status::Error => Some(-6),
            Status::PartialFailure => Some(-1),
            Status::Running => Some(1),
            Status::Pending => Some(9),
            Status::JustResubmitted => Some(10),
            Status::Unknown => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Error | Status::PartialFailure)
    }

    /// Still waiting for the job to start.
    ///
    /// `Unknown` counts as waiting: a status query that matched nothing is
    /// usually a job the scheduler has not listed yet.
    pub fn is_waiting_to_start(self) -> bool {
        matches!(
            self,
            Status::Pending | Status::JustResubmitted | Status::Unknown
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Done => "Done",
            Status::Error => "Error",
            Status::PartialFailure => "Failed",
            Status::Running => "Running",
            Status::Pending => "Pending",
            Status::JustResubmitted => "RESUB",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// How a job is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Render a batch script and hand it to the scheduler.
    #[default]
    Batch,
    /// Run the command as a local process and write sentinels afterwards.
    Local,
}

/// How a job's status is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusStrategy {
    /// Look for `start.*`, `done.*` and `error.*` marker files.
    #[default]
    Sentinel,
    /// Ask the scheduler (`squeue`, then `sacct`).
    Scheduler,
}

impl FromStr for StatusStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sentinel" => Ok(StatusStrategy::Sentinel),
            "scheduler" => Ok(StatusStrategy::Scheduler),
            other => Err(format!(
                "invalid status strategy: {other} (expected \"sentinel\" or \"scheduler\")"
            )),
        }
    }
}

/// How the input file (namelist) is handed to the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// `exe input`
    #[default]
    Arg,
    /// `exe < input`
    Stdin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(Status::Done.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(Status::PartialFailure.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::JustResubmitted.is_terminal());
        assert!(!Status::Unknown.is_terminal());
    }

    #[test]
    fn codes_match_operator_conventions() {
        assert_eq!(Status::Done.code(), Some(0));
        assert_eq!(Status::Error.code(), Some(-6));
        assert_eq!(Status::PartialFailure.code(), Some(-1));
        assert_eq!(Status::Running.code(), Some(1));
        assert_eq!(Status::Pending.code(), Some(9));
        assert_eq!(Status::JustResubmitted.code(), Some(10));
        assert_eq!(Status::Unknown.code(), None);
    }

    #[test]
    fn strategy_from_str() {
        assert_eq!("Scheduler".parse::<StatusStrategy>(), Ok(StatusStrategy::Scheduler));
        assert!("squeue".parse::<StatusStrategy>().is_err());
    }
}
