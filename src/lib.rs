// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;
pub mod ready;
pub mod scheduler;
pub mod types;
pub mod workflow;

use std::path::PathBuf;
use std::thread;

use anyhow::{Result, bail};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::context::{KeepWaiting, RunContext};
use crate::workflow::{RunOptions, StepServices, plan_cases, run_cases};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the run context (filesystem, clock, cancellation)
/// - scheduler clients and status resolvers
/// - SIGINT/SIGTERM handling
/// - the workflow driver
pub fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let options = args.run_options();

    if args.dry_run {
        print_dry_run(&cfg, &options)?;
        return Ok(());
    }

    let ctx = RunContext::system();
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signal_handle = signals.handle();
    let keep_waiting = ctx.keep_waiting().clone();
    let signal_thread = thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || stop_on_signal(&mut signals, &keep_waiting))?;

    let services = StepServices::production(&cfg, &ctx);
    info!(
        run = %cfg.run.name,
        cases = cfg.case.len(),
        work_root = ?cfg.run.work_root,
        "starting run"
    );
    let report = run_cases(&cfg, &services, &options);

    signal_handle.close();
    if signal_thread.join().is_err() {
        warn!("signal thread panicked");
    }

    for line in report.summary_lines() {
        println!("{line}");
    }
    if !report.is_success() {
        let failed = report.failures().count();
        bail!("{failed} of {} case(s) failed", report.outcomes.len());
    }
    Ok(())
}

fn stop_on_signal(signals: &mut Signals, keep_waiting: &KeepWaiting) {
    for sig in signals.forever() {
        warn!(signal = sig, "received termination signal, stopping all waits");
        keep_waiting.clear();
    }
}

/// Simple dry-run output: print each case's directory and steps.
fn print_dry_run(cfg: &ConfigFile, options: &RunOptions) -> Result<()> {
    println!("cyclerun dry-run");
    println!("  run.name = {}", cfg.run.name);
    println!("  run.work_root = {}", cfg.run.work_root.display());
    println!("  run.status = {:?}", cfg.run.status);
    println!();

    let plans = plan_cases(cfg, options)?;
    println!("cases ({}):", plans.len());
    for (name, steps) in plans {
        println!("  - {name}");
        for step in steps {
            let mode = cfg
                .program
                .get(step)
                .map(|p| format!("{:?}", p.mode).to_lowercase())
                .unwrap_or_default();
            println!("      {step} ({mode})");
        }
    }

    debug!("dry-run complete (no submission)");
    Ok(())
}
