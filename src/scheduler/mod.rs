// src/scheduler/mod.rs

//! Scheduler clients.
//!
//! A client turns a [`JobDescriptor`] into a running unit of work and hands
//! back its [`JobId`]. It never waits for the job; that is the job handle's
//! business.
//!
//! - [`slurm`] renders a batch script, submits it with `sbatch` and queries
//!   state with `squeue`/`sacct`.
//! - [`local`] runs the command in-process and writes the sentinels itself.
//! - [`script`] renders the batch script text.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::errors::SubmitError;
use crate::job::{JobDescriptor, JobId};

pub mod local;
pub mod script;
pub mod slurm;

pub use local::LocalClient;
pub use slurm::{SlurmClient, SlurmQuery, SlurmSettings};

/// One submission: what to run, where, and (on resubmission) which tasks.
#[derive(Debug, Clone, Copy)]
pub struct SubmitRequest<'a> {
    pub descriptor: &'a JobDescriptor,
    /// Working directory; the member base directory for ensembles.
    pub work_dir: &'a Path,
    /// Explicit task indices. `None` submits every task of the descriptor.
    pub tasks: Option<&'a [u32]>,
}

impl SubmitRequest<'_> {
    /// Task indices that will actually run, `None` for a single job.
    pub fn effective_tasks(&self) -> Option<Vec<u32>> {
        match self.tasks {
            Some(tasks) => Some(tasks.to_vec()),
            None => self.descriptor.tasks(),
        }
    }
}

pub trait SchedulerClient: Send + Sync + Debug {
    fn submit(&self, req: &SubmitRequest<'_>) -> Result<JobId, SubmitError>;

    /// Where the client leaves the job's script artifact, if it writes one.
    fn script_path(&self, _descriptor: &JobDescriptor, _work_dir: &Path) -> Option<PathBuf> {
        None
    }
}
