// src/job/descriptor.rs

//! Immutable description of one unit of work.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::types::{ExecMode, InputMode};

/// Scheduler-assigned (or locally assigned) job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resources claimed from the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub nprocs: u32,
    pub cores_per_node: u32,
    pub walltime_minutes: u32,
    /// `None` falls back to the scheduler's default partition.
    pub partition: Option<String>,
    pub exclusive: bool,
    /// Total number of tries allowed, the first submission included.
    pub retry_budget: u32,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            nprocs: 1,
            cores_per_node: 1,
            walltime_minutes: 30,
            partition: None,
            exclusive: false,
            retry_budget: 1,
        }
    }
}

impl ResourceRequest {
    pub fn nodes(&self) -> u32 {
        self.nprocs.div_ceil(self.cores_per_node.max(1))
    }

    /// Wall time as `HH:MM:00`.
    pub fn walltime(&self) -> String {
        let (hours, minutes) = (self.walltime_minutes / 60, self.walltime_minutes % 60);
        format!("{hours:02}:{minutes:02}:00")
    }
}

#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub name: String,
    pub executable: PathBuf,
    pub input: Option<PathBuf>,
    pub input_mode: InputMode,
    pub output: Option<PathBuf>,
    pub resources: ResourceRequest,
    /// `None` for a single task, `Some(n)` for tasks `0..=n`.
    pub ensemble: Option<u32>,
    pub mode: ExecMode,
    /// Remove the script artifact once the job is done.
    pub cleanup_script: bool,
}

impl JobDescriptor {
    /// Job name derived the usual way: the output file stem when there is
    /// one, the executable's file name otherwise.
    pub fn derive_name(executable: &Path, output: Option<&Path>) -> String {
        let from = match output {
            Some(out) => out.file_stem(),
            None => executable.file_name(),
        };
        from.map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".to_string())
    }

    pub fn tasks(&self) -> Option<Vec<u32>> {
        self.ensemble.map(|n| (0..=n).collect())
    }

    pub fn is_array(&self) -> bool {
        self.ensemble.is_some()
    }

    /// Command line run inside the job, without the MPI launcher.
    pub fn command_line(&self) -> String {
        let mut cmd = self.executable.display().to_string();
        if let Some(input) = &self.input {
            match self.input_mode {
                InputMode::Arg => cmd.push_str(&format!(" {}", input.display())),
                InputMode::Stdin => cmd.push_str(&format!(" < {}", input.display())),
            }
        }
        if let Some(output) = &self.output {
            cmd.push_str(&format!(" > {}", output.display()));
        }
        cmd
    }

    /// File name of the rendered batch script.
    pub fn script_name(&self, ext: &str) -> String {
        format!("{}.{}", self.name, ext)
    }
}

/// Directory of ensemble member `index` under `base`.
pub fn member_dir(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("_{index}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> JobDescriptor {
        JobDescriptor {
            name: "geo01".into(),
            executable: PathBuf::from("/opt/wps/geogrid.exe"),
            input: Some(PathBuf::from("namelist.wps")),
            input_mode: InputMode::Stdin,
            output: Some(PathBuf::from("geo01.output")),
            resources: ResourceRequest::default(),
            ensemble: None,
            mode: ExecMode::Batch,
            cleanup_script: false,
        }
    }

    #[test]
    fn nodes_round_up() {
        let res = ResourceRequest {
            nprocs: 49,
            cores_per_node: 24,
            ..ResourceRequest::default()
        };
        assert_eq!(res.nodes(), 3);
    }

    #[test]
    fn walltime_is_hours_and_minutes() {
        let res = ResourceRequest {
            walltime_minutes: 95,
            ..ResourceRequest::default()
        };
        assert_eq!(res.walltime(), "01:35:00");
    }

    #[test]
    fn command_line_redirects_stdin_and_stdout() {
        assert_eq!(
            descriptor().command_line(),
            "/opt/wps/geogrid.exe < namelist.wps > geo01.output"
        );
    }

    #[test]
    fn name_comes_from_output_stem_or_executable() {
        assert_eq!(
            JobDescriptor::derive_name(Path::new("/x/real.exe"), Some(Path::new("real1_1800.output"))),
            "real1_1800"
        );
        assert_eq!(JobDescriptor::derive_name(Path::new("/x/real.exe"), None), "real.exe");
    }

    #[test]
    fn ensemble_tasks_include_control_member() {
        let mut d = descriptor();
        d.ensemble = Some(3);
        assert_eq!(d.tasks(), Some(vec![0, 1, 2, 3]));
        assert_eq!(member_dir(Path::new("/run/real1"), 2), PathBuf::from("/run/real1_2"));
    }
}
