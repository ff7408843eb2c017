// src/workflow/step.rs

//! One step of a case: wait for inputs, prepare, submit, supervise.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{CaseConfig, ConfigFile, ProgramConfig, WaitTarget};
use crate::errors::{CaseError, CaseErrorKind, CycleRunError, JobError, ReadyError};
use crate::job::{JobDescriptor, JobHandle, ResourceRequest, member_dir, supervise};
use crate::ready::ArtifactFile;

use super::StepServices;
use super::dirs;
use super::shape::CaseShape;

/// Describe the job `step` runs for `case`.
///
/// Without an explicit `output`, stdout goes to `<step><n>_<HHMM>.output`
/// and the job is named after that file.
pub fn build_descriptor(step: &str, program: &ProgramConfig, case: &CaseConfig) -> JobDescriptor {
    let output = PathBuf::from(program.output.clone().unwrap_or_else(|| {
        format!(
            "{step}{}_{}.output",
            CaseShape::dir_index(case.number),
            case.start.format("%H%M")
        )
    }));

    JobDescriptor {
        name: JobDescriptor::derive_name(&program.executable, Some(&output)),
        executable: program.executable.clone(),
        input: program.input.as_ref().map(PathBuf::from),
        input_mode: program.input_mode,
        output: Some(output),
        resources: ResourceRequest {
            nprocs: program.nprocs,
            cores_per_node: program.cores_per_node,
            walltime_minutes: program.walltime,
            partition: program.partition.clone(),
            exclusive: program.exclusive,
            retry_budget: program.retry,
        },
        ensemble: program.ensemble,
        mode: program.mode,
        cleanup_script: program.cleanup_script,
    }
}

/// Paths named by one `wait_for` entry.
pub fn expand_target(
    target: &WaitTarget,
    work_root: &Path,
    case: &CaseConfig,
    case_dir: &Path,
) -> Vec<PathBuf> {
    let base = target
        .path
        .replace("{case_dir}", &case_dir.display().to_string())
        .replace("{work_root}", &work_root.display().to_string())
        .replace("{date}", &case.start.format("%Y%m%d").to_string())
        .replace("{time}", &case.start.format("%H%M").to_string());

    let texts: Vec<String> = match target.members {
        Some(n) => (0..=n)
            .map(|m| base.replace("{member}", &m.to_string()))
            .collect(),
        None => vec![base],
    };

    texts
        .into_iter()
        .map(|text| {
            let path = PathBuf::from(text);
            if path.is_absolute() {
                path
            } else {
                case_dir.join(path)
            }
        })
        .collect()
}

/// Runs the steps of one case against shared services.
#[derive(Debug)]
pub struct StepRunner<'a> {
    config: &'a ConfigFile,
    case: &'a CaseConfig,
    services: &'a StepServices,
    case_dir: PathBuf,
}

impl<'a> StepRunner<'a> {
    pub fn new(config: &'a ConfigFile, case: &'a CaseConfig, services: &'a StepServices) -> Self {
        let case_dir = dirs::case_dir(&config.run.work_root, case.start, &case.domain);
        Self {
            config,
            case,
            services,
            case_dir,
        }
    }

    pub fn case_dir(&self) -> &Path {
        &self.case_dir
    }

    fn fail(&self, step: &str, subject: impl Into<String>, kind: impl Into<CaseErrorKind>) -> CaseError {
        CaseError::new(self.case.name(), step, subject, kind)
    }

    /// Run `step` to completion. Returns once its job is done.
    pub fn run(&self, step: &str) -> Result<(), CaseError> {
        let program = self.config.program.get(step).ok_or_else(|| {
            self.fail(
                step,
                step,
                CycleRunError::ConfigError(format!("no [program.{step}] section")),
            )
        })?;
        let work_dir = dirs::work_dir(&self.case_dir, step, self.case.number);
        info!(case = %self.case.name(), step, dir = ?work_dir, "step started");

        self.wait_inputs(step, program)?;
        self.prepare(step, program, &work_dir)?;

        let descriptor = build_descriptor(step, program, self.case);
        let services = self.services.for_mode(program.mode).clone();
        let mut handle = JobHandle::submit(descriptor, work_dir.clone(), services)
            .map_err(|e| self.fail(step, step, JobError::from(e)))?;

        handle.status();
        supervise(&mut handle, self.config.wait.max_start())
            .map_err(|e| self.fail(step, handle.subject(), e))?;

        info!(
            case = %self.case.name(),
            step,
            job = %handle.name(),
            tries = handle.numtry(),
            "step done"
        );
        Ok(())
    }

    fn wait_inputs(&self, step: &str, program: &ProgramConfig) -> Result<(), CaseError> {
        let waiter = &self.services.waiter;
        for target in &program.wait_for {
            let paths = expand_target(target, &self.config.run.work_root, self.case, &self.case_dir);
            let spec = self.config.wait.file_spec(target);
            debug!(step, files = paths.len(), marker = target.marker, "waiting for inputs");

            if target.marker {
                for (ready, path) in paths.iter().enumerate() {
                    let mut artifact = ArtifactFile::new(path.clone(), &self.config.marker);
                    if !artifact.wait_ready(waiter, spec.max_exist, spec.max_stable) {
                        let err = ReadyError::FileNotReady {
                            path: artifact.marker.clone(),
                            ready,
                            expected: paths.len(),
                        };
                        return Err(self.fail(step, artifact.path.display().to_string(), err));
                    }
                }
            } else {
                waiter.require_all(step, &paths, &spec).map_err(|err| {
                    let ReadyError::FileNotReady { path, .. } = &err;
                    self.fail(step, path.display().to_string(), err)
                })?;
            }
        }
        Ok(())
    }

    fn prepare(&self, step: &str, program: &ProgramConfig, work_dir: &Path) -> Result<(), CaseError> {
        let dirs: Vec<(PathBuf, Option<u32>)> = match program.ensemble {
            Some(n) => (0..=n).map(|m| (member_dir(work_dir, m), Some(m))).collect(),
            None => vec![(work_dir.to_path_buf(), None)],
        };
        for (dir, member) in dirs {
            self.services
                .preparer
                .prepare(step, program, &dir, member)
                .map_err(|e| self.fail(step, dir.display().to_string(), CycleRunError::Other(e)))?;
        }
        Ok(())
    }
}
