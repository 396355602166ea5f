//! Database model for job runs.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use patrimoine_core::errors::{DatabaseError, Error, Result};
use patrimoine_core::schedules::JobRun;

#[derive(Queryable, Identifiable, Selectable, AsChangeset, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::job_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct JobRunDB {
    pub id: i64,
    pub job_name: String,
    pub run_date: NaiveDate,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub state: String,
    pub ok: Option<bool>,
    pub items_inserted: i64,
    pub items_skipped: i64,
    pub items_failed: i64,
    pub message: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::job_runs)]
pub struct NewJobRunDB {
    pub job_name: String,
    pub run_date: NaiveDate,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub state: String,
    pub ok: Option<bool>,
    pub items_inserted: i64,
    pub items_skipped: i64,
    pub items_failed: i64,
    pub message: Option<String>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            Error::Database(DatabaseError::Internal(format!(
                "Malformed job run timestamp '{}': {}",
                raw, e
            )))
        })
}

impl From<&JobRun> for JobRunDB {
    fn from(run: &JobRun) -> Self {
        Self {
            id: run.id,
            job_name: run.job_name.clone(),
            run_date: run.run_date,
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|dt| dt.to_rfc3339()),
            state: run.state.as_str().to_string(),
            ok: run.ok,
            items_inserted: run.items_inserted,
            items_skipped: run.items_skipped,
            items_failed: run.items_failed,
            message: run.message.clone(),
        }
    }
}

impl From<JobRun> for NewJobRunDB {
    fn from(run: JobRun) -> Self {
        Self {
            job_name: run.job_name,
            run_date: run.run_date,
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|dt| dt.to_rfc3339()),
            state: run.state.as_str().to_string(),
            ok: run.ok,
            items_inserted: run.items_inserted,
            items_skipped: run.items_skipped,
            items_failed: run.items_failed,
            message: run.message,
        }
    }
}

impl TryFrom<JobRunDB> for JobRun {
    type Error = Error;

    fn try_from(db: JobRunDB) -> Result<Self> {
        Ok(Self {
            id: db.id,
            job_name: db.job_name,
            run_date: db.run_date,
            started_at: parse_timestamp(&db.started_at)?,
            finished_at: db.finished_at.as_deref().map(parse_timestamp).transpose()?,
            state: db.state.parse()?,
            ok: db.ok,
            items_inserted: db.items_inserted,
            items_skipped: db.items_skipped,
            items_failed: db.items_failed,
            message: db.message,
        })
    }
}
