//! Repository for job run persistence.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;

use patrimoine_core::errors::{DatabaseError, Result};
use patrimoine_core::schedules::{JobRun, JobRunRepositoryTrait};

use super::model::{JobRunDB, NewJobRunDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::job_runs;

pub struct JobRunRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl JobRunRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl JobRunRepositoryTrait for JobRunRepository {
    async fn create(&self, run: JobRun) -> Result<JobRun> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(job_runs::table)
                    .values(&NewJobRunDB::from(run))
                    .returning(JobRunDB::as_returning())
                    .get_result::<JobRunDB>(conn)
                    .into_core()?
                    .try_into()
            })
            .await
    }

    async fn update(&self, run: JobRun) -> Result<JobRun> {
        self.writer
            .exec(move |conn| {
                let updated = diesel::update(job_runs::table.find(run.id))
                    .set(&JobRunDB::from(&run))
                    .execute(conn)
                    .into_core()?;
                if updated == 0 {
                    return Err(DatabaseError::NotFound(format!("Job run {}", run.id)).into());
                }
                Ok(run)
            })
            .await
    }

    fn list_for_date(&self, job_name: &str, run_date: NaiveDate) -> Result<Vec<JobRun>> {
        let mut conn = get_connection(&self.pool)?;

        job_runs::table
            .filter(job_runs::job_name.eq(job_name))
            .filter(job_runs::run_date.eq(run_date))
            .order(job_runs::id.asc())
            .select(JobRunDB::as_select())
            .load::<JobRunDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(JobRun::try_from)
            .collect()
    }

    /// Most recent runs first.
    fn list_recent(&self, job_name: &str, limit: i64) -> Result<Vec<JobRun>> {
        let mut conn = get_connection(&self.pool)?;

        job_runs::table
            .filter(job_runs::job_name.eq(job_name))
            .order(job_runs::id.desc())
            .limit(limit.max(0))
            .select(JobRunDB::as_select())
            .load::<JobRunDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(JobRun::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup;
    use patrimoine_core::constants::MATERIALIZER_JOB_NAME;
    use patrimoine_core::schedules::JobRunState;

    #[tokio::test]
    async fn run_lifecycle_is_persisted() {
        let db = setup();
        let repo = JobRunRepository::new(Arc::clone(&db.pool), db.writer.clone());
        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();

        let mut run = repo
            .create(JobRun::start(MATERIALIZER_JOB_NAME, day))
            .await
            .unwrap();
        assert!(run.id > 0);
        assert_eq!(run.state, JobRunState::Running);

        run.complete(3, 1, "{\"inserted\":3}".to_string());
        repo.update(run.clone()).await.unwrap();

        let runs = repo.list_for_date(MATERIALIZER_JOB_NAME, day).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].state, JobRunState::Done);
        assert_eq!(runs[0].ok, Some(true));
        assert_eq!(runs[0].items_inserted, 3);
        assert!(runs[0].finished_at.is_some());
        assert!(repo.list_for_date("other-job", day).unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_runs_are_newest_first() {
        let db = setup();
        let repo = JobRunRepository::new(Arc::clone(&db.pool), db.writer.clone());
        for day in 1..=3 {
            let d = NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
            repo.create(JobRun::start(MATERIALIZER_JOB_NAME, d)).await.unwrap();
        }

        let recent = repo.list_recent(MATERIALIZER_JOB_NAME, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].run_date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
    }

    #[tokio::test]
    async fn updating_unknown_run_fails() {
        let db = setup();
        let repo = JobRunRepository::new(Arc::clone(&db.pool), db.writer.clone());
        let mut run = JobRun::start(MATERIALIZER_JOB_NAME, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        run.id = 77;
        assert!(repo.update(run).await.unwrap_err().is_not_found());
    }
}
