// src/workflow/prepare.rs

//! Input preparation before a program is submitted.
//!
//! Namelist contents are the business of whatever implements
//! [`InputPreparer`]; the driver only says which program, which directory
//! and which ensemble member.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::ProgramConfig;
use crate::fs::FileSystem;

pub trait InputPreparer: Send + Sync + Debug {
    /// Make `dir` ready to run `program`.
    fn prepare(
        &self,
        program: &str,
        config: &ProgramConfig,
        dir: &Path,
        member: Option<u32>,
    ) -> Result<()>;
}

/// Creates the directory and copies the program's template in as its input.
#[derive(Debug, Clone)]
pub struct TemplateCopy {
    fs: Arc<dyn FileSystem>,
}

impl TemplateCopy {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl InputPreparer for TemplateCopy {
    fn prepare(
        &self,
        program: &str,
        config: &ProgramConfig,
        dir: &Path,
        member: Option<u32>,
    ) -> Result<()> {
        self.fs.create_dir_all(dir)?;

        if let (Some(template), Some(input)) = (&config.template, &config.input) {
            let target = dir.join(input);
            self.fs
                .copy(template, &target)
                .with_context(|| format!("preparing input of {program}"))?;
            debug!(program, ?member, target = ?target, "input copied from template");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn program(template: Option<&str>) -> ProgramConfig {
        toml::from_str::<ProgramConfig>(&format!(
            "executable = \"real.exe\"\ninput = \"namelist.input\"\n{}",
            template
                .map(|t| format!("template = \"{t}\""))
                .unwrap_or_default()
        ))
        .unwrap()
    }

    #[test]
    fn copies_template_as_input() {
        let fs = MockFileSystem::new();
        fs.add_file("/tmpl/namelist.real", "&time_control /", SystemTime::UNIX_EPOCH);
        let preparer = TemplateCopy::new(Arc::new(fs.clone()));

        preparer
            .prepare("real", &program(Some("/tmpl/namelist.real")), Path::new("/run/real1"), None)
            .unwrap();
        assert_eq!(
            fs.read_to_string(&PathBuf::from("/run/real1/namelist.input")).unwrap(),
            "&time_control /"
        );
    }

    #[test]
    fn missing_template_is_an_error() {
        let fs = MockFileSystem::new();
        let preparer = TemplateCopy::new(Arc::new(fs));
        let err = preparer
            .prepare("real", &program(Some("/tmpl/none")), Path::new("/run/real1"), Some(2))
            .unwrap_err();
        assert!(err.to_string().contains("preparing input of real"));
    }

    #[test]
    fn no_template_only_creates_directory() {
        let fs = MockFileSystem::new();
        let preparer = TemplateCopy::new(Arc::new(fs.clone()));
        preparer
            .prepare("wrf", &program(None), Path::new("/run/wrf1"), None)
            .unwrap();
        assert!(fs.files().is_empty());
    }
}
