#![allow(dead_code)]

use std::path::{Path, PathBuf};

use cyclerun::config::{ConfigFile, parse_str};
use cyclerun::job::{JobDescriptor, ResourceRequest};
use cyclerun::types::{ExecMode, InputMode};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Sections are collected as TOML text and go through the same parsing and
/// validation as a file on disk.
pub struct ConfigFileBuilder {
    run: Vec<String>,
    wait: Vec<String>,
    programs: Vec<String>,
    cases: Vec<String>,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            run: Vec::new(),
            wait: Vec::new(),
            programs: Vec::new(),
            cases: Vec::new(),
        }
    }

    pub fn with_work_root(mut self, root: &Path) -> Self {
        self.run.push(format!("work_root = {:?}", root.display().to_string()));
        self
    }

    /// `"sentinel"` or `"scheduler"`.
    pub fn with_status(mut self, strategy: &str) -> Self {
        self.run.push(format!("status = {strategy:?}"));
        self
    }

    /// One `key = value` line of `[wait]`.
    pub fn with_wait(mut self, line: &str) -> Self {
        self.wait.push(line.to_string());
        self
    }

    /// `[program.<name>]` with the given body lines.
    pub fn with_program(mut self, name: &str, body: &str) -> Self {
        self.programs.push(format!("[program.{name}]\n{body}\n"));
        self
    }

    /// A local program that just runs `executable`.
    pub fn with_local_program(self, name: &str, executable: &str) -> Self {
        let body = format!("executable = {executable:?}\nmode = \"local\"");
        self.with_program(name, &body)
    }

    pub fn with_case(self, number: u32, domain: &str, start: &str) -> Self {
        self.with_case_lines(number, domain, start, "")
    }

    pub fn with_case_lines(mut self, number: u32, domain: &str, start: &str, extra: &str) -> Self {
        self.cases.push(format!(
            "[[case]]\nnumber = {number}\ndomain = {domain:?}\nstart = {start:?}\n{extra}\n"
        ));
        self
    }

    pub fn to_toml(&self) -> String {
        let mut text = String::new();
        if !self.run.is_empty() {
            text.push_str(&format!("[run]\n{}\n\n", self.run.join("\n")));
        }
        if !self.wait.is_empty() {
            text.push_str(&format!("[wait]\n{}\n\n", self.wait.join("\n")));
        }
        for p in &self.programs {
            text.push_str(p);
            text.push('\n');
        }
        for c in &self.cases {
            text.push_str(c);
            text.push('\n');
        }
        text
    }

    pub fn build(self) -> ConfigFile {
        let raw = parse_str(&self.to_toml()).expect("builder produced invalid TOML");
        ConfigFile::try_from(raw).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobDescriptor`.
pub struct DescriptorBuilder {
    descriptor: JobDescriptor,
}

impl DescriptorBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: JobDescriptor {
                name: name.to_string(),
                executable: PathBuf::from(format!("/opt/bin/{name}.exe")),
                input: None,
                input_mode: InputMode::Arg,
                output: None,
                resources: ResourceRequest::default(),
                ensemble: None,
                mode: ExecMode::Batch,
                cleanup_script: false,
            },
        }
    }

    pub fn walltime_minutes(mut self, minutes: u32) -> Self {
        self.descriptor.resources.walltime_minutes = minutes;
        self
    }

    pub fn retry_budget(mut self, tries: u32) -> Self {
        self.descriptor.resources.retry_budget = tries;
        self
    }

    pub fn ensemble(mut self, highest_member: u32) -> Self {
        self.descriptor.ensemble = Some(highest_member);
        self
    }

    pub fn local(mut self) -> Self {
        self.descriptor.mode = ExecMode::Local;
        self
    }

    pub fn build(self) -> JobDescriptor {
        self.descriptor
    }
}
