// src/scheduler/local.rs

//! Local execution: run the command on this host and write the sentinels
//! a batch script would have written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::context::SubmissionCounter;
use crate::errors::SubmitError;
use crate::exec::{CommandRunner, shell_command};
use crate::fs::FileSystem;
use crate::job::JobId;
use crate::job::sentinel::{self, Sentinel};

use super::{SchedulerClient, SubmitRequest};

/// Runs jobs as local processes, one task after the other.
///
/// The job id is the submission serial. The call blocks until every task
/// has exited, so the first status resolution already sees a final state.
#[derive(Debug, Clone)]
pub struct LocalClient {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    counter: SubmissionCounter,
}

impl LocalClient {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileSystem>,
        counter: SubmissionCounter,
    ) -> Self {
        Self {
            runner,
            fs,
            counter,
        }
    }

    fn run_task(
        &self,
        req: &SubmitRequest<'_>,
        dir: &Path,
        sentinel_for: impl Fn(Sentinel) -> PathBuf,
    ) -> Result<bool, SubmitError> {
        let job = &req.descriptor.name;
        let io_err = |source| SubmitError::Io {
            job: job.clone(),
            source,
        };

        self.fs.create_dir_all(dir).map_err(io_err)?;
        self.fs.touch(&sentinel_for(Sentinel::Start)).map_err(io_err)?;

        let line = req.descriptor.command_line();
        let (program, args) = shell_command(&line);
        let output = self
            .runner
            .run(&program, &args, Some(dir))
            .map_err(|source| SubmitError::Spawn {
                command: line.clone(),
                source,
            })?;

        let ok = output.success();
        if !ok {
            warn!(job = %job, dir = ?dir, exit_code = ?output.code, stderr = %output.stderr.trim(), "local task failed");
        }
        let kind = if ok { Sentinel::Done } else { Sentinel::Error };
        self.fs.touch(&sentinel_for(kind)).map_err(io_err)?;
        Ok(ok)
    }
}

impl SchedulerClient for LocalClient {
    fn submit(&self, req: &SubmitRequest<'_>) -> Result<JobId, SubmitError> {
        let serial = self.counter.next();
        let id = JobId::new(serial.to_string());
        let name = &req.descriptor.name;
        info!(serial, job = %name, "- {serial:02} - running locally");

        match req.effective_tasks() {
            None => {
                self.run_task(req, req.work_dir, |kind| {
                    sentinel::single_path(kind, req.work_dir, name, &id)
                })?;
            }
            Some(tasks) => {
                for task in tasks {
                    let dir = crate::job::member_dir(req.work_dir, task);
                    self.run_task(req, &dir, |kind| {
                        sentinel::task_path(kind, req.work_dir, name, &id, task)
                    })?;
                }
            }
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::fs::mock::MockFileSystem;
    use crate::job::{JobDescriptor, ResourceRequest};
    use crate::types::{ExecMode, InputMode};
    use std::io;
    use std::sync::Mutex;

    /// Fails whenever it runs in a directory ending with `_1`.
    #[derive(Debug, Default)]
    struct FailMemberOne {
        dirs: Mutex<Vec<PathBuf>>,
    }

    impl CommandRunner for FailMemberOne {
        fn run(&self, _program: &str, _args: &[String], cwd: Option<&Path>) -> io::Result<CommandOutput> {
            let dir = cwd.map(Path::to_path_buf).unwrap_or_default();
            let fail = dir.to_string_lossy().ends_with("_1");
            self.dirs.lock().unwrap().push(dir);
            Ok(if fail {
                CommandOutput::failed(2, "boom")
            } else {
                CommandOutput::ok("")
            })
        }
    }

    fn descriptor(ensemble: Option<u32>) -> JobDescriptor {
        JobDescriptor {
            name: "joinwrf".into(),
            executable: PathBuf::from("joinwrf"),
            input: None,
            input_mode: InputMode::Arg,
            output: None,
            resources: ResourceRequest::default(),
            ensemble,
            mode: ExecMode::Local,
            cleanup_script: false,
        }
    }

    #[test]
    fn single_local_job_writes_done_sentinel() {
        let fs = MockFileSystem::new();
        let runner = Arc::new(FailMemberOne::default());
        let client = LocalClient::new(runner, Arc::new(fs.clone()), SubmissionCounter::new());
        let d = descriptor(None);

        let id = client
            .submit(&SubmitRequest {
                descriptor: &d,
                work_dir: Path::new("/run/joinwrf1"),
                tasks: None,
            })
            .unwrap();

        assert_eq!(id, JobId::new("1"));
        assert!(fs.exists(Path::new("/run/joinwrf1/start.joinwrf.1")));
        assert!(fs.exists(Path::new("/run/joinwrf1/done.joinwrf.1")));
    }

    #[test]
    fn ensemble_runs_requested_members_only() {
        let fs = MockFileSystem::new();
        let runner = Arc::new(FailMemberOne::default());
        let client = LocalClient::new(runner.clone(), Arc::new(fs.clone()), SubmissionCounter::new());
        let d = descriptor(Some(3));

        let id = client
            .submit(&SubmitRequest {
                descriptor: &d,
                work_dir: Path::new("/run/real1"),
                tasks: Some(&[1, 2]),
            })
            .unwrap();

        assert_eq!(
            *runner.dirs.lock().unwrap(),
            vec![PathBuf::from("/run/real1_1"), PathBuf::from("/run/real1_2")]
        );
        assert!(fs.exists(&sentinel::task_path(Sentinel::Error, Path::new("/run/real1"), "joinwrf", &id, 1)));
        assert!(fs.exists(&sentinel::task_path(Sentinel::Done, Path::new("/run/real1"), "joinwrf", &id, 2)));
        assert!(!fs.exists(&sentinel::task_path(Sentinel::Done, Path::new("/run/real1"), "joinwrf", &id, 0)));
    }
}
