//! Scheduled-obligation materializer and its job-run audit trail.

pub mod amortization;
mod job_run_model;
mod materializer_model;
mod materializer_service;

#[cfg(test)]
mod materializer_service_tests;

pub use job_run_model::{JobRun, JobRunRepositoryTrait, JobRunState};
pub use materializer_model::{DetailReason, MaterializeReport, RunDetail, RunScope};
pub use materializer_service::{MaterializerService, MaterializerServiceTrait};
