//! Job run records: one row per materializer execution.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::Result;

/// State machine of a run: `Running` then exactly one of `Done` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobRunState {
    #[default]
    Running,
    Done,
    Error,
}

impl JobRunState {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobRunState::Running => "running",
            JobRunState::Done => "done",
            JobRunState::Error => "error",
        }
    }
}

impl fmt::Display for JobRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobRunState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(JobRunState::Running),
            "done" => Ok(JobRunState::Done),
            "error" => Ok(JobRunState::Error),
            other => Err(Error::invalid(format!("Unknown job run state '{}'", other))),
        }
    }
}

/// Audit record of one batch execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    /// Store-assigned id, 0 until persisted
    pub id: i64,
    pub job_name: String,
    /// The as-of date the run materialized
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: JobRunState,
    pub ok: Option<bool>,
    pub items_inserted: i64,
    pub items_skipped: i64,
    pub items_failed: i64,
    /// JSON summary, truncated
    pub message: Option<String>,
}

impl JobRun {
    /// A new run in the `Running` state
    pub fn start(job_name: impl Into<String>, run_date: NaiveDate) -> Self {
        Self {
            id: 0,
            job_name: job_name.into(),
            run_date,
            started_at: Utc::now(),
            finished_at: None,
            state: JobRunState::Running,
            ok: None,
            items_inserted: 0,
            items_skipped: 0,
            items_failed: 0,
            message: None,
        }
    }

    /// Mark the run as completed successfully
    pub fn complete(&mut self, inserted: i64, skipped: i64, message: String) {
        self.state = JobRunState::Done;
        self.ok = Some(true);
        self.items_inserted = inserted;
        self.items_skipped = skipped;
        self.finished_at = Some(Utc::now());
        self.message = Some(message);
    }

    /// Mark the run as failed. Counts are kept for the record even though nothing was committed.
    pub fn fail(&mut self, inserted: i64, skipped: i64, failed: i64, message: String) {
        self.state = JobRunState::Error;
        self.ok = Some(false);
        self.items_inserted = inserted;
        self.items_skipped = skipped;
        self.items_failed = failed;
        self.finished_at = Some(Utc::now());
        self.message = Some(message);
    }
}

/// Trait for JobRun persistence operations
#[async_trait]
pub trait JobRunRepositoryTrait: Send + Sync {
    /// Insert a run and return it with its assigned id
    async fn create(&self, run: JobRun) -> Result<JobRun>;

    /// Overwrite the mutable fields of a run
    async fn update(&self, run: JobRun) -> Result<JobRun>;

    /// Runs of `job_name` for `run_date`, oldest first
    fn list_for_date(&self, job_name: &str, run_date: NaiveDate) -> Result<Vec<JobRun>>;

    /// Most recent runs of `job_name`, newest first
    fn list_recent(&self, job_name: &str, limit: i64) -> Result<Vec<JobRun>>;
}
