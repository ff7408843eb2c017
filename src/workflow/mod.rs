// src/workflow/mod.rs

//! Workflow driver.
//!
//! Every case runs on its own named thread and walks the steps of its
//! shape in order. A failed step stops its case only; the others keep
//! going, and the run ends once every case thread has returned.
//!
//! - [`shape`] lists the steps of each case number.
//! - [`case`] picks which of them run.
//! - [`step`] waits for inputs, prepares, submits and supervises one step.
//! - [`dirs`] and [`prepare`] lay out working directories.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use crate::config::{CaseConfig, ConfigFile};
use crate::context::RunContext;
use crate::errors::{CaseError, CaseErrorKind};
use crate::exec::{CommandRunner, ProcessRunner};
use crate::job::{JobServices, SchedulerQueryResolver, SentinelFileResolver, StatusResolver};
use crate::ready::ReadinessWaiter;
use crate::scheduler::{LocalClient, SlurmClient, SlurmQuery};
use crate::types::{ExecMode, StatusStrategy};

pub mod case;
pub mod dirs;
pub mod prepare;
pub mod shape;
pub mod step;

pub use case::CaseRun;
pub use prepare::{InputPreparer, TemplateCopy};
pub use shape::CaseShape;
pub use step::{StepRunner, build_descriptor, expand_target};

/// Services shared by every case of a run.
#[derive(Debug, Clone)]
pub struct StepServices {
    /// Jobs handed to the batch scheduler.
    pub batch: JobServices,
    /// Jobs run as local processes.
    pub local: JobServices,
    pub waiter: ReadinessWaiter,
    pub preparer: Arc<dyn InputPreparer>,
}

impl StepServices {
    /// Real scheduler commands, real processes, the context's filesystem.
    pub fn production(config: &ConfigFile, ctx: &RunContext) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
        let settings = config.scheduler.settings();
        let timing = config.wait.timing();

        let sentinels: Arc<dyn StatusResolver> = Arc::new(SentinelFileResolver::new(ctx.fs_arc()));
        let batch_resolver: Arc<dyn StatusResolver> = match config.run.status {
            StatusStrategy::Sentinel => sentinels.clone(),
            StatusStrategy::Scheduler => Arc::new(SchedulerQueryResolver::new(Arc::new(
                SlurmQuery::new(
                    settings.clone(),
                    runner.clone(),
                    ctx.clock_arc(),
                    ctx.keep_waiting().clone(),
                ),
            ))),
        };

        let slurm = SlurmClient::new(settings, runner.clone(), ctx.fs_arc(), ctx.counter().clone());
        let local = LocalClient::new(runner, ctx.fs_arc(), ctx.counter().clone());

        Self {
            batch: JobServices::new(Arc::new(slurm), batch_resolver, ctx, timing),
            local: JobServices::new(Arc::new(local), sentinels, ctx, timing),
            waiter: ReadinessWaiter::from_context(ctx),
            preparer: Arc::new(TemplateCopy::new(ctx.fs_arc())),
        }
    }

    pub fn for_mode(&self, mode: ExecMode) -> &JobServices {
        match mode {
            ExecMode::Batch => &self.batch,
            ExecMode::Local => &self.local,
        }
    }
}

/// Which cases to run and where to start.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only cases whose name (`case-3_d01`), number or domain matches.
    pub case_filter: Option<String>,
    /// Resume every selected case from this step.
    pub from: Option<String>,
}

impl RunOptions {
    fn selects(&self, case: &CaseConfig) -> bool {
        match &self.case_filter {
            Some(filter) => {
                *filter == case.name() || *filter == case.domain || *filter == case.number.to_string()
            }
            None => true,
        }
    }
}

/// How one case ended.
#[derive(Debug)]
pub struct CaseOutcome {
    pub case: String,
    /// Steps that finished, in order.
    pub completed: Vec<String>,
    pub error: Option<CaseError>,
}

impl CaseOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{}: ok ({} steps)", self.case, self.completed.len()),
            Some(err) => write!(f, "{}: FAILED at `{}`: {}", self.case, err.step, err.kind),
        }
    }
}

/// Outcome of every case of a run, in config order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<CaseOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(CaseOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseError> {
        self.outcomes.iter().filter_map(|o| o.error.as_ref())
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.outcomes.iter().map(ToString::to_string).collect()
    }
}

/// Steps each selected case would run, without running anything.
pub fn plan_cases(
    config: &ConfigFile,
    options: &RunOptions,
) -> crate::errors::Result<Vec<(String, Vec<&'static str>)>> {
    config
        .case
        .iter()
        .filter(|c| options.selects(c))
        .map(|c| {
            let run = CaseRun::new(c, config, options.from.as_deref())?;
            Ok((c.name(), run.planned_steps()))
        })
        .collect()
}

fn run_case(config: &ConfigFile, case: &CaseConfig, services: &StepServices, options: &RunOptions) -> CaseOutcome {
    let name = case.name();
    let mut outcome = CaseOutcome {
        case: name.clone(),
        completed: Vec::new(),
        error: None,
    };

    let mut run = match CaseRun::new(case, config, options.from.as_deref()) {
        Ok(run) => run,
        Err(err) => {
            let start = options.from.clone().unwrap_or_default();
            outcome.error = Some(CaseError::new(&name, start, "case", err));
            return outcome;
        }
    };
    let runner = StepRunner::new(config, run.case(), services);
    info!(case = %name, shape = %run.shape(), dir = ?runner.case_dir(), "case started");

    for &step in run.shape().steps() {
        if !run.should_run(step) {
            continue;
        }
        match runner.run(step) {
            Ok(()) => outcome.completed.push(step.to_string()),
            Err(err) => {
                error!(case = %name, step, error = %err, "case stopped");
                run.mark_failed();
                outcome.error = Some(err);
            }
        }
    }

    if outcome.is_success() {
        info!(case = %name, steps = outcome.completed.len(), "case finished");
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run the selected cases concurrently and wait for all of them.
pub fn run_cases(config: &ConfigFile, services: &StepServices, options: &RunOptions) -> RunReport {
    let cases: Vec<&CaseConfig> = config.case.iter().filter(|c| options.selects(c)).collect();
    if cases.is_empty() {
        warn!(filter = ?options.case_filter, "no case selected");
    }

    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = cases
            .iter()
            .map(|&case| {
                let spawned = thread::Builder::new()
                    .name(case.name())
                    .spawn_scoped(scope, move || run_case(config, case, services, options));
                (case, spawned)
            })
            .collect();

        handles
            .into_iter()
            .map(|(case, spawned)| {
                let joined = spawned
                    .map_err(|e| CaseErrorKind::Panicked(format!("could not start thread: {e}")))
                    .and_then(|h| h.join().map_err(|p| CaseErrorKind::Panicked(panic_message(&*p))));
                joined.unwrap_or_else(|kind| CaseOutcome {
                    case: case.name(),
                    completed: Vec::new(),
                    error: Some(CaseError::new(case.name(), "-", "case thread", kind)),
                })
            })
            .collect::<Vec<_>>()
    });

    RunReport { outcomes }
}
