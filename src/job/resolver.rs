// src/job/resolver.rs

//! Status resolution strategies.
//!
//! A [`JobHandle`](super::JobHandle) does not know where its status comes
//! from; it is given a [`StatusResolver`] at construction:
//!
//! - [`SentinelFileResolver`] inspects `start`/`done`/`error` marker files.
//! - [`SchedulerQueryResolver`] asks the scheduler through a [`StatusQuery`].

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::types::Status;

use super::descriptor::JobId;
use super::sentinel::{self, Sentinel};

/// What a resolver needs to know about a job.
#[derive(Debug, Clone, Copy)]
pub struct JobView<'a> {
    pub name: &'a str,
    /// Working directory; the member base directory for array jobs.
    pub work_dir: &'a Path,
    pub id: Option<&'a JobId>,
    /// Task indices for array jobs, `None` for a single task.
    pub tasks: Option<&'a [u32]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: Status,
    /// Tasks currently considered failed (or, while running, not yet done).
    /// `None` when the strategy cannot tell.
    pub failed_tasks: Option<Vec<u32>>,
    /// Short per-task summary for progress logs, e.g. `(done:3; fail:[1]; start:4)`.
    pub summary: String,
}

impl Resolution {
    pub fn plain(status: Status) -> Self {
        Self {
            status,
            failed_tasks: None,
            summary: String::new(),
        }
    }
}

pub trait StatusResolver: Send + Sync + Debug {
    fn resolve(&self, job: &JobView<'_>) -> Resolution;
}

/// Low-level scheduler status lookup by job id.
///
/// Array jobs are reported as a whole, with the failing tasks listed in
/// [`Resolution::failed_tasks`].
pub trait StatusQuery: Send + Sync + Debug {
    fn query(&self, id: &JobId) -> Resolution;
}

#[derive(Debug, Clone)]
pub struct SchedulerQueryResolver {
    query: Arc<dyn StatusQuery>,
}

impl SchedulerQueryResolver {
    pub fn new(query: Arc<dyn StatusQuery>) -> Self {
        Self { query }
    }
}

impl StatusResolver for SchedulerQueryResolver {
    fn resolve(&self, job: &JobView<'_>) -> Resolution {
        match job.id {
            Some(id) => {
                let res = self.query.query(id);
                debug!(job = job.name, %id, status = %res.status, summary = %res.summary, "resolved from scheduler");
                res
            }
            None => Resolution::plain(Status::Unknown),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentinelFileResolver {
    fs: Arc<dyn FileSystem>,
}

impl SentinelFileResolver {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn remove_quietly(&self, path: &Path) {
        if let Err(err) = self.fs.remove_file(path) {
            warn!(path = ?path, error = %err, "could not remove stale start sentinel");
        }
    }

    fn resolve_single(&self, job: &JobView<'_>, id: &JobId) -> Resolution {
        let start = sentinel::single_path(Sentinel::Start, job.work_dir, job.name, id);
        let done = sentinel::single_path(Sentinel::Done, job.work_dir, job.name, id);
        let error = sentinel::single_path(Sentinel::Error, job.work_dir, job.name, id);

        let status = if self.fs.exists(&done) {
            Status::Done
        } else if self.fs.exists(&error) {
            Status::Error
        } else if self.fs.exists(&start) {
            Status::Running
        } else {
            Status::Pending
        };

        if status.is_terminal() {
            self.remove_quietly(&start);
        }

        Resolution::plain(status)
    }

    fn resolve_array(&self, job: &JobView<'_>, id: &JobId, tasks: &[u32]) -> Resolution {
        let path = |kind, task| sentinel::task_path(kind, job.work_dir, job.name, id, task);

        let mut done = Vec::new();
        let mut failed = Vec::new();
        let mut started = 0usize;
        for &task in tasks {
            if self.fs.exists(&path(Sentinel::Done, task)) {
                done.push(task);
            }
            if self.fs.exists(&path(Sentinel::Error, task)) {
                failed.push(task);
            }
            if self.fs.exists(&path(Sentinel::Start, task)) {
                started += 1;
            }
        }

        let summary = format!(
            "(done:{}; fail:{:?}; start:{})",
            done.len(),
            failed,
            started
        );

        let total = tasks.len();
        let (status, failed_tasks) = if done.len() == total {
            (Status::Done, Vec::new())
        } else if failed.len() == total {
            (Status::Error, tasks.to_vec())
        } else if done.len() + failed.len() == total {
            (Status::PartialFailure, failed)
        } else if started == total {
            let not_done = tasks.iter().copied().filter(|t| !done.contains(t)).collect();
            (Status::Running, not_done)
        } else {
            return Resolution {
                status: Status::Pending,
                failed_tasks: None,
                summary,
            };
        };

        if status.is_terminal() {
            for &task in tasks {
                self.remove_quietly(&path(Sentinel::Start, task));
            }
        }

        debug!(job = job.name, %id, %status, %summary, "resolved array job from sentinels");

        Resolution {
            status,
            failed_tasks: Some(failed_tasks),
            summary,
        }
    }
}

impl StatusResolver for SentinelFileResolver {
    fn resolve(&self, job: &JobView<'_>) -> Resolution {
        let Some(id) = job.id else {
            return Resolution::plain(Status::Unknown);
        };

        match job.tasks {
            Some(tasks) => self.resolve_array(job, id, tasks),
            None => self.resolve_single(job, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn setup() -> (MockFileSystem, SentinelFileResolver) {
        let fs = MockFileSystem::new();
        let resolver = SentinelFileResolver::new(Arc::new(fs.clone()));
        (fs, resolver)
    }

    fn view<'a>(id: &'a JobId, dir: &'a Path, tasks: Option<&'a [u32]>) -> JobView<'a> {
        JobView {
            name: "real",
            work_dir: dir,
            id: Some(id),
            tasks,
        }
    }

    fn touch(fs: &MockFileSystem, path: PathBuf) {
        fs.add_file(path, Vec::new(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn single_job_walks_pending_running_done() {
        let (fs, resolver) = setup();
        let id = JobId::new("77");
        let dir = PathBuf::from("/run/real1");
        let v = view(&id, &dir, None);

        assert_eq!(resolver.resolve(&v).status, Status::Pending);

        touch(&fs, dir.join("start.real.77"));
        assert_eq!(resolver.resolve(&v).status, Status::Running);

        touch(&fs, dir.join("done.real.77"));
        assert_eq!(resolver.resolve(&v).status, Status::Done);
        assert!(!fs.exists(&dir.join("start.real.77")), "start sentinel cleaned up");
    }

    #[test]
    fn single_job_error_wins_over_start() {
        let (fs, resolver) = setup();
        let id = JobId::new("78");
        let dir = PathBuf::from("/run/wrf1");
        touch(&fs, dir.join("start.real.78"));
        touch(&fs, dir.join("error.real.78"));

        assert_eq!(resolver.resolve(&view(&id, &dir, None)).status, Status::Error);
    }

    #[test]
    fn array_partial_failure_lists_failed_tasks() {
        let (fs, resolver) = setup();
        let id = JobId::new("90");
        let base = PathBuf::from("/run/real1");
        let tasks = [0, 1, 2, 3];
        for t in 0..3 {
            touch(&fs, sentinel::task_path(Sentinel::Done, &base, "real", &id, t));
        }
        touch(&fs, sentinel::task_path(Sentinel::Error, &base, "real", &id, 3));

        let res = resolver.resolve(&view(&id, &base, Some(&tasks)));
        assert_eq!(res.status, Status::PartialFailure);
        assert_eq!(res.failed_tasks, Some(vec![3]));
        assert_eq!(res.summary, "(done:3; fail:[3]; start:0)");
    }

    #[test]
    fn array_running_records_unfinished_tasks() {
        let (fs, resolver) = setup();
        let id = JobId::new("91");
        let base = PathBuf::from("/run/real1");
        let tasks = [0, 1, 2];
        for t in tasks {
            touch(&fs, sentinel::task_path(Sentinel::Start, &base, "real", &id, t));
        }
        touch(&fs, sentinel::task_path(Sentinel::Done, &base, "real", &id, 1));

        let res = resolver.resolve(&view(&id, &base, Some(&tasks)));
        assert_eq!(res.status, Status::Running);
        assert_eq!(res.failed_tasks, Some(vec![0, 2]));
    }

    #[test]
    fn array_pending_until_all_started() {
        let (fs, resolver) = setup();
        let id = JobId::new("92");
        let base = PathBuf::from("/run/real1");
        let tasks = [0, 1];
        touch(&fs, sentinel::task_path(Sentinel::Start, &base, "real", &id, 0));

        assert_eq!(
            resolver.resolve(&view(&id, &base, Some(&tasks))).status,
            Status::Pending
        );
    }

    #[test]
    fn array_all_error_and_all_done() {
        let (fs, resolver) = setup();
        let id = JobId::new("93");
        let base = PathBuf::from("/run/real1");
        let tasks = [0, 1];
        for t in tasks {
            touch(&fs, sentinel::task_path(Sentinel::Start, &base, "real", &id, t));
            touch(&fs, sentinel::task_path(Sentinel::Error, &base, "real", &id, t));
        }
        let res = resolver.resolve(&view(&id, &base, Some(&tasks)));
        assert_eq!(res.status, Status::Error);
        assert_eq!(res.failed_tasks, Some(vec![0, 1]));
        for t in tasks {
            assert!(!fs.exists(&sentinel::task_path(Sentinel::Start, &base, "real", &id, t)));
        }

        let id = JobId::new("94");
        for t in tasks {
            touch(&fs, sentinel::task_path(Sentinel::Done, &base, "real", &id, t));
        }
        assert_eq!(
            resolver.resolve(&view(&id, &base, Some(&tasks))).status,
            Status::Done
        );
    }

    #[test]
    fn missing_id_is_unknown() {
        let (_fs, resolver) = setup();
        let dir = PathBuf::from("/run/x");
        let v = JobView {
            name: "x",
            work_dir: &dir,
            id: None,
            tasks: None,
        };
        assert_eq!(resolver.resolve(&v).status, Status::Unknown);
    }
}
