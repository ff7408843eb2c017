// src/scheduler/script.rs

//! Batch script rendering.
//!
//! The script is the audit trail of a submission: it records resources, log
//! locations and the exact command, and it writes the `start`/`done`/`error`
//! sentinels the sentinel resolver looks for.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::job::JobDescriptor;

use super::slurm::SlurmSettings;

/// Where a rendered script goes and what it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLayout {
    /// Directory the script file is written to.
    pub script_dir: PathBuf,
    /// Directory the job `cd`s into (may contain a shell variable).
    pub run_dir: String,
    /// Sentinel suffix after `<kind>.<name>.`
    pub append: &'static str,
    /// Log path prefix; `.out` and `.err` are appended.
    pub log_prefix: String,
}

impl ScriptLayout {
    pub fn for_job(descriptor: &JobDescriptor, work_dir: &Path) -> Self {
        let base = work_dir.display();
        let name = &descriptor.name;
        if descriptor.is_array() {
            Self {
                script_dir: PathBuf::from(format!("{base}_0")),
                run_dir: format!("{base}_${{SLURM_ARRAY_TASK_ID}}"),
                append: "${SLURM_ARRAY_JOB_ID}_${SLURM_ARRAY_TASK_ID}",
                log_prefix: format!("{base}_%a/{name}_%a_%j"),
            }
        } else {
            Self {
                script_dir: work_dir.to_path_buf(),
                run_dir: base.to_string(),
                append: "${SLURM_JOBID}",
                log_prefix: format!("{base}/{name}_%j"),
            }
        }
    }
}

/// Render the SLURM batch script for `descriptor`.
pub fn render(descriptor: &JobDescriptor, layout: &ScriptLayout, settings: &SlurmSettings) -> String {
    let res = &descriptor.resources;
    let name = &descriptor.name;
    let partition = res
        .partition
        .as_deref()
        .unwrap_or(settings.default_partition.as_str());

    let mut s = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(s, "#!/bin/bash");
    let _ = writeln!(s, "#SBATCH -p {partition}");
    let _ = writeln!(s, "#SBATCH -J {name}");
    let _ = writeln!(s, "#SBATCH -N {} -n {}", res.nodes(), res.nprocs);
    let _ = writeln!(s, "#SBATCH --ntasks-per-node={}", res.cores_per_node);
    if res.exclusive {
        let _ = writeln!(s, "#SBATCH --exclusive");
    }
    let _ = writeln!(s, "#SBATCH -t {}", res.walltime());
    let _ = writeln!(s, "#SBATCH -o {}.out", layout.log_prefix);
    let _ = writeln!(s, "#SBATCH -e {}.err", layout.log_prefix);
    let _ = writeln!(s);

    for line in &settings.preamble {
        let _ = writeln!(s, "{line}");
    }
    if !settings.preamble.is_empty() {
        let _ = writeln!(s);
    }

    let _ = writeln!(s, r#"echo "Job Started: $(date). Job Id: $SLURM_JOBID""#);
    let _ = writeln!(s, "cd {}", layout.run_dir);
    let _ = writeln!(s, "ulimit -s unlimited");
    let _ = writeln!(s);
    let _ = writeln!(s, "touch start.{name}.{}", layout.append);
    let _ = writeln!(s);
    let _ = writeln!(s, "{}", launch_line(descriptor, &settings.launcher));
    let _ = writeln!(s);
    let _ = writeln!(s, "if [[ $? -eq 0 ]]; then");
    let _ = writeln!(s, "  touch done.{name}.{}", layout.append);
    let _ = writeln!(s, "else");
    let _ = writeln!(s, "  touch error.{name}.{}", layout.append);
    let _ = writeln!(s, "fi");
    let _ = writeln!(s);
    let _ = writeln!(s, r#"echo "Job Ended: $(date).""#);
    s
}

fn launch_line(descriptor: &JobDescriptor, launcher: &str) -> String {
    format!(
        "{launcher} -n {} {}",
        descriptor.resources.nprocs,
        descriptor.command_line()
    )
}
