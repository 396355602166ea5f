//! Background scheduler for the daily materializer run.
//!
//! Runs once at start-up for today, then every day at the configured local hour.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::main_lib::AppState;
use patrimoine_core::schedules::{JobRun, JobRunState};
use patrimoine_core::utils::time_utils::ledger_date_today;

/// Starts the background materializer scheduler.
pub fn start_materializer_scheduler(state: Arc<AppState>, hour: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tz = state.timezone;
        info!("Materializer scheduler started (daily at {:02}:00 {})", hour, tz);

        let mut last_run: Option<NaiveDate> = None;
        loop {
            let today = ledger_date_today(tz);
            if last_run == Some(today) {
                debug!("Materializer already ran for {}", today);
            } else {
                run_materializer(&state, today).await;
                last_run = Some(today);
            }

            let now = Utc::now();
            let next = next_run_at(now, tz, hour);
            let wait = (next - now).to_std().unwrap_or(Duration::from_secs(60));
            debug!("Next materializer run at {}", next);
            tokio::time::sleep(wait).await;
        }
    })
}

/// Runs the materializer once for `as_of` and logs the outcome.
pub async fn run_materializer(state: &AppState, as_of: NaiveDate) -> Option<JobRun> {
    info!("Running materializer for {}...", as_of);
    match state.materializer_service.execute(as_of).await {
        Ok(run) => {
            if run.state == JobRunState::Done {
                info!(
                    "Materializer run {} done: {} inserted, {} skipped",
                    run.id, run.items_inserted, run.items_skipped
                );
            } else {
                warn!(
                    "Materializer run {} ended in state {}: {}",
                    run.id,
                    run.state,
                    run.message.as_deref().unwrap_or("")
                );
            }
            Some(run)
        }
        Err(e) => {
            // The job-run record itself could not be written.
            error!("Materializer run for {} could not be recorded: {}", as_of, e);
            None
        }
    }
}

/// First instant strictly after `now` at `hour:00` local time in `tz`.
///
/// A local hour skipped by a DST jump moves to the next day.
pub fn next_run_at(now: DateTime<Utc>, tz: Tz, hour: u32) -> DateTime<Utc> {
    let mut day = now.with_timezone(&tz).date_naive();
    for _ in 0..3 {
        let candidate = day
            .and_hms_opt(hour, 0, 0)
            .and_then(|local| tz.from_local_datetime(&local).earliest())
            .map(|at| at.with_timezone(&Utc));
        if let Some(at) = candidate {
            if at > now {
                return at;
            }
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    now + chrono::Duration::hours(24)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn fires_later_the_same_day_when_the_hour_is_ahead() {
        // 23:30 UTC on Jan 14 is 00:30 in Paris on Jan 15.
        let next = next_run_at(utc(2024, 1, 14, 23, 30), chrono_tz::Europe::Paris, 2);
        assert_eq!(next, utc(2024, 1, 15, 1, 0));
    }

    #[test]
    fn fires_the_next_day_once_the_hour_has_passed() {
        let next = next_run_at(utc(2024, 1, 15, 9, 0), chrono_tz::Europe::Paris, 2);
        assert_eq!(next, utc(2024, 1, 16, 1, 0));
    }

    #[test]
    fn exact_hour_moves_to_the_next_day() {
        let next = next_run_at(utc(2024, 1, 15, 1, 0), chrono_tz::Europe::Paris, 2);
        assert_eq!(next, utc(2024, 1, 16, 1, 0));
    }

    #[test]
    fn follows_summer_time_offset() {
        let next = next_run_at(utc(2024, 7, 1, 12, 0), chrono_tz::Europe::Paris, 2);
        assert_eq!(next, utc(2024, 7, 2, 0, 0));
    }

    #[test]
    fn skipped_local_hour_moves_to_the_next_day() {
        // 2024-03-31 02:00 does not exist in Paris.
        let next = next_run_at(utc(2024, 3, 30, 12, 0), chrono_tz::Europe::Paris, 2);
        assert_eq!(next, utc(2024, 4, 1, 0, 0));
    }
}
