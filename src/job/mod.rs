// src/job/mod.rs

//! Job lifecycle: description, status resolution, waiting and retry.
//!
//! - [`descriptor`] holds the immutable description of a unit of work.
//! - [`sentinel`] names the marker files job scripts leave behind.
//! - [`resolver`] turns scheduler answers or sentinels into a [`Status`](crate::types::Status).
//! - [`handle`] owns one submitted job: polling wait, resubmission,
//!   and the `supervise` loop that combines them.

pub mod descriptor;
pub mod handle;
pub mod resolver;
pub mod sentinel;

pub use descriptor::{JobDescriptor, JobId, ResourceRequest, member_dir};
pub use handle::{JobHandle, JobServices, WaitTiming, supervise};
pub use resolver::{
    JobView, Resolution, SchedulerQueryResolver, SentinelFileResolver, StatusQuery, StatusResolver,
};
