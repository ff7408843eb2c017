// src/workflow/case.rs

//! Per-case step selection.

use crate::config::{CaseConfig, ConfigFile};
use crate::errors::{CycleRunError, Result};

use super::shape::CaseShape;

/// Step guard of one running case.
#[derive(Debug, Clone)]
pub struct CaseRun<'a> {
    case: &'a CaseConfig,
    shape: CaseShape,
    programs: Vec<String>,
    failed: bool,
}

impl<'a> CaseRun<'a> {
    /// Select the steps of `case`, optionally resuming from `from`.
    pub fn new(case: &'a CaseConfig, config: &ConfigFile, from: Option<&str>) -> Result<Self> {
        let shape = CaseShape::from_number(case.number).ok_or_else(|| {
            CycleRunError::ConfigError(format!("unknown case number {}", case.number))
        })?;

        let mut programs: Vec<String> = match &case.programs {
            Some(list) => list.clone(),
            None => shape
                .steps()
                .iter()
                .filter(|step| config.program.contains_key(**step))
                .map(|step| step.to_string())
                .collect(),
        };
        programs.dedup();
        if case.nested {
            programs.retain(|p| p != "ungrib");
        }

        let mut run = Self {
            case,
            shape,
            programs,
            failed: false,
        };
        if let Some(step) = from {
            run.resume_from(step)?;
        }
        Ok(run)
    }

    pub fn case(&self) -> &'a CaseConfig {
        self.case
    }

    pub fn shape(&self) -> CaseShape {
        self.shape
    }

    pub fn programs(&self) -> &[String] {
        &self.programs
    }

    /// Keep the steps from `step` on; a step outside the list runs alone.
    pub fn resume_from(&mut self, step: &str) -> Result<()> {
        if !self.shape.has_step(step) {
            return Err(CycleRunError::UnknownStep(format!(
                "'{}' is not a step of {}",
                step, self.shape
            )));
        }

        let order = self.shape.steps();
        let rank = |name: &str| order.iter().position(|s| *s == name);
        if self.programs.iter().any(|p| p == step) {
            let from = rank(step);
            self.programs.retain(|p| rank(p) >= from);
        } else {
            self.programs = vec![step.to_string()];
        }
        Ok(())
    }

    pub fn should_run(&self, step: &str) -> bool {
        !self.failed && self.programs.iter().any(|p| p == step)
    }

    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Steps that will run, in execution order.
    pub fn planned_steps(&self) -> Vec<&'static str> {
        self.shape
            .steps()
            .iter()
            .copied()
            .filter(|s| self.should_run(s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_str;

    fn config(programs: &str) -> ConfigFile {
        let mut text = String::new();
        for p in ["ungrib", "geogrid", "metgrid", "tinterp", "real", "radremap", "news3dvar", "wrf"] {
            text.push_str(&format!("[program.{p}]\nexecutable = \"{p}.exe\"\n"));
        }
        text.push_str(&format!(
            "[[case]]\nnumber = 3\ndomain = \"d01\"\nstart = \"2024-05-01T18:00:00\"\n{programs}"
        ));
        ConfigFile::try_from(parse_str(&text).unwrap()).unwrap()
    }

    #[test]
    fn defaults_to_configured_steps_of_the_shape() {
        let cfg = config("");
        let run = CaseRun::new(&cfg.case[0], &cfg, None).unwrap();
        assert_eq!(
            run.planned_steps(),
            ["ungrib", "geogrid", "metgrid", "tinterp", "real", "radremap", "news3dvar", "wrf"]
        );
    }

    #[test]
    fn resume_slices_from_listed_step() {
        let cfg = config("");
        let run = CaseRun::new(&cfg.case[0], &cfg, Some("real")).unwrap();
        assert_eq!(run.planned_steps(), ["real", "radremap", "news3dvar", "wrf"]);
    }

    #[test]
    fn resume_from_unlisted_step_runs_it_alone() {
        let cfg = config("programs = [\"ungrib\", \"geogrid\"]\n");
        let run = CaseRun::new(&cfg.case[0], &cfg, Some("news3dvar")).unwrap();
        assert_eq!(run.planned_steps(), ["news3dvar"]);
    }

    #[test]
    fn resume_from_foreign_step_is_rejected() {
        let cfg = config("");
        let err = CaseRun::new(&cfg.case[0], &cfg, Some("joinwrf")).unwrap_err();
        assert!(matches!(err, CycleRunError::UnknownStep(_)));
    }

    #[test]
    fn failure_stops_all_remaining_steps() {
        let cfg = config("");
        let mut run = CaseRun::new(&cfg.case[0], &cfg, None).unwrap();
        assert!(run.should_run("wrf"));
        run.mark_failed();
        assert!(!run.should_run("wrf"));
        assert!(run.planned_steps().is_empty());
    }

    #[test]
    fn nested_domain_skips_ungrib() {
        let cfg = config("nested = true\n");
        let run = CaseRun::new(&cfg.case[0], &cfg, None).unwrap();
        assert!(!run.should_run("ungrib"));
        assert!(run.should_run("geogrid"));
    }
}
