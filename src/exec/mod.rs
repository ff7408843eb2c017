// src/exec/mod.rs

//! Process execution layer.
//!
//! Everything that shells out (`sbatch`, `squeue`, `sacct`, local jobs) goes
//! through a [`CommandRunner`], so the scheduler client and the status query
//! can be tested with scripted output instead of a real cluster.
//!
//! - [`backend`] provides the `CommandRunner` trait and its output type.
//! - [`process`] is the `std::process::Command` implementation used in
//!   production.

pub mod backend;
pub mod process;

pub use backend::{CommandOutput, CommandRunner};
pub use process::{ProcessRunner, shell_command};
