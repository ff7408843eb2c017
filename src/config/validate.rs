// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::config::model::{CaseConfig, ConfigFile, ProgramConfig, RawConfigFile};
use crate::errors::{CycleRunError, Result};
use crate::ready::MarkerRule;
use crate::workflow::CaseShape;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CycleRunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let marker = MarkerRule::new(&raw.marker.pattern, raw.marker.replacement.clone())
            .map_err(|e| {
                CycleRunError::ConfigError(format!(
                    "[marker].pattern '{}' is not a valid regex: {}",
                    raw.marker.pattern, e
                ))
            })?;
        Ok(ConfigFile::new_unchecked(raw, marker))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_cases(cfg)?;
    validate_wait_section(cfg)?;
    for (name, program) in &cfg.program {
        validate_program(name, program)?;
    }
    validate_cases(&cfg.case, &cfg.program)?;
    Ok(())
}

fn ensure_has_cases(cfg: &RawConfigFile) -> Result<()> {
    if cfg.case.is_empty() {
        return Err(CycleRunError::ConfigError(
            "config must contain at least one [[case]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_wait_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.wait.poll == 0 {
        return Err(CycleRunError::ConfigError(
            "[wait].poll must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.wait.file_tick == 0 {
        return Err(CycleRunError::ConfigError(
            "[wait].file_tick must be >= 1 (got 0)".to_string(),
        ));
    }
    // Progress is logged on poll ticks; 0 turns it off.
    let cadences = [
        ("start_progress", cfg.wait.start_progress),
        ("finish_progress", cfg.wait.finish_progress),
    ];
    for (field, every) in cadences {
        if every % cfg.wait.poll != 0 {
            return Err(CycleRunError::ConfigError(format!(
                "[wait].{} must be a multiple of [wait].poll ({}), got {}",
                field, cfg.wait.poll, every
            )));
        }
    }
    Ok(())
}

fn validate_program(name: &str, program: &ProgramConfig) -> Result<()> {
    let checks = [
        ("nprocs", program.nprocs),
        ("cores_per_node", program.cores_per_node),
        ("walltime", program.walltime),
        ("retry", program.retry),
    ];
    for (field, value) in checks {
        if value == 0 {
            return Err(CycleRunError::ConfigError(format!(
                "[program.{}].{} must be >= 1 (got 0)",
                name, field
            )));
        }
    }
    if program.template.is_some() && program.input.is_none() {
        return Err(CycleRunError::ConfigError(format!(
            "[program.{}] has a template but no input file name",
            name
        )));
    }
    Ok(())
}

fn validate_cases(cases: &[CaseConfig], programs: &BTreeMap<String, ProgramConfig>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for case in cases {
        let Some(shape) = CaseShape::from_number(case.number) else {
            return Err(CycleRunError::ConfigError(format!(
                "unknown case number {} (expected 1-7 or 27)",
                case.number
            )));
        };

        if case.domain.trim().is_empty() {
            return Err(CycleRunError::ConfigError(format!(
                "case {} has an empty domain",
                case.number
            )));
        }

        if !seen.insert((case.name(), case.start)) {
            return Err(CycleRunError::ConfigError(format!(
                "duplicate case '{}' starting {}",
                case.name(),
                case.start
            )));
        }

        for step in case.programs.iter().flatten() {
            if !shape.has_step(step) {
                return Err(CycleRunError::UnknownStep(format!(
                    "'{}' is not a step of {} (case {})",
                    step,
                    shape,
                    case.name()
                )));
            }
            if !programs.contains_key(step) {
                return Err(CycleRunError::ConfigError(format!(
                    "case {} lists '{}' but there is no [program.{}] section",
                    case.name(),
                    step,
                    step
                )));
            }
        }
    }
    Ok(())
}
