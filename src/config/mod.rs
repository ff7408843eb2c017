// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs` is the TOML-backed data model.
//! - `loader.rs` reads a file from disk.
//! - `validate.rs` turns the raw model into a checked [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{
    CaseConfig, ConfigFile, MarkerSection, ProgramConfig, RawConfigFile, RunSection,
    SchedulerSection, WaitSection, WaitTarget,
};
