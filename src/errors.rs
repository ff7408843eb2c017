// src/errors.rs

//! Crate-wide error types.
//!
//! Component errors are separate enums so callers can match on the kind of
//! failure a step hit; [`CycleRunError`] covers loading and wiring.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Status;

#[derive(Error, Debug)]
pub enum CycleRunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CycleRunError>;

/// The scheduler did not accept a job. Never retried.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("job <{job}> was not submitted correctly: `{command}` printed {output:?}")]
    NoJobId {
        job: String,
        command: String,
        output: String,
    },

    #[error("preparing job <{job}>: {source}")]
    Io {
        job: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("waiting for job <{job}> exceeded {waited_secs} seconds")]
    Timeout { job: String, waited_secs: u64 },

    #[error("job <{job}> failed with status {status}")]
    Failed { job: String, status: Status },

    #[error("job <{job}> failed after {tries} tries")]
    RetryBudgetExhausted { job: String, tries: u32 },
}

#[derive(Error, Debug)]
pub enum ReadyError {
    #[error("{ready} of {expected} file(s) ready, waiting for {path:?}")]
    FileNotReady {
        path: PathBuf,
        ready: usize,
        expected: usize,
    },
}

/// Why a case stopped.
#[derive(Error, Debug)]
pub enum CaseErrorKind {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    NotReady(#[from] ReadyError),

    #[error(transparent)]
    Config(#[from] CycleRunError),

    #[error("worker thread panicked: {0}")]
    Panicked(String),
}

/// A fatal failure recorded against one case.
#[derive(Error, Debug)]
#[error("case {case}: step `{step}` failed on {subject}: {kind}")]
pub struct CaseError {
    pub case: String,
    pub step: String,
    /// The job id or file the step was working on.
    pub subject: String,
    #[source]
    pub kind: CaseErrorKind,
}

impl CaseError {
    pub fn new(
        case: impl Into<String>,
        step: impl Into<String>,
        subject: impl Into<String>,
        kind: impl Into<CaseErrorKind>,
    ) -> Self {
        Self {
            case: case.into(),
            step: step.into(),
            subject: subject.into(),
            kind: kind.into(),
        }
    }
}
