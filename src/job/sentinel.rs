// src/job/sentinel.rs

//! Names of the marker files a job script leaves in its working directory.
//!
//! `start.<name>.<id>[_<task>]` on entry, then `done.…` or `error.…` on exit.
//! Array tasks write into their own member directory `<base>_<task>`.

use std::fmt;
use std::path::{Path, PathBuf};

use super::descriptor::{JobId, member_dir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Start,
    Done,
    Error,
}

impl Sentinel {
    pub fn prefix(self) -> &'static str {
        match self {
            Sentinel::Start => "start",
            Sentinel::Done => "done",
            Sentinel::Error => "error",
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Sentinel of a single-task job in `dir`.
pub fn single_path(kind: Sentinel, dir: &Path, name: &str, id: &JobId) -> PathBuf {
    dir.join(format!("{}.{}.{}", kind.prefix(), name, id))
}

/// Sentinel of array task `task`, inside member directory `<base>_<task>`.
pub fn task_path(kind: Sentinel, base: &Path, name: &str, id: &JobId, task: u32) -> PathBuf {
    member_dir(base, task).join(format!("{}.{}.{}_{}", kind.prefix(), name, id, task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_task_names() {
        let id = JobId::new("4711");
        assert_eq!(
            single_path(Sentinel::Done, Path::new("/run/geogrid"), "geo01", &id),
            PathBuf::from("/run/geogrid/done.geo01.4711")
        );
        assert_eq!(
            task_path(Sentinel::Error, Path::new("/run/real1"), "real", &id, 3),
            PathBuf::from("/run/real1_3/error.real.4711_3")
        );
    }
}
