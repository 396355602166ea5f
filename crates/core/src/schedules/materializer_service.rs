use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use super::amortization;
use super::job_run_model::{JobRun, JobRunRepositoryTrait, JobRunState};
use super::materializer_model::{DetailReason, MaterializeReport, RunDetail, RunScope};
use crate::assets::{Asset, AssetRepositoryTrait, Loan, RecurringDeposit};
use crate::constants::MATERIALIZER_JOB_NAME;
use crate::errors::Result;
use crate::ledger::{
    EventData, EventKind, GroupOutcome, IdempotencyKey, LedgerRepositoryTrait, LedgerWriteBatch,
    NewLedgerEvent, CATEGORY_DCA, CATEGORY_LOAN_PAYMENT, DATA_LOAN_ID, DATA_ORIGIN, DATA_PERIOD,
    ORIGIN_AUTO_DCA, ORIGIN_AUTO_LOAN,
};
use crate::recurrence::{month_offset, Frequency, RecurrenceRule};

#[async_trait]
pub trait MaterializerServiceTrait: Send + Sync {
    /// What a run for `as_of` would insert, without writing anything.
    fn preview(&self, as_of: NaiveDate) -> Result<MaterializeReport>;

    /// Materializes every due occurrence up to `as_of` in one transaction.
    async fn run_for_day(&self, as_of: NaiveDate) -> Result<MaterializeReport>;

    /// `run_for_day` wrapped in a persisted job-run record. A failed run is
    /// recorded with state `error`; the returned record tells which.
    async fn execute(&self, as_of: NaiveDate) -> Result<JobRun>;
}

/// Occurrence waiting to be written: the events of one idempotent group and
/// the detail reported once the group's fate is known.
struct PlannedGroup {
    detail: RunDetail,
    events: Vec<NewLedgerEvent>,
}

#[derive(Default)]
struct RunPlan {
    groups: Vec<PlannedGroup>,
    report: MaterializeReport,
}

pub struct MaterializerService {
    ledger_repository: Arc<dyn LedgerRepositoryTrait>,
    asset_repository: Arc<dyn AssetRepositoryTrait>,
    job_run_repository: Arc<dyn JobRunRepositoryTrait>,
}

impl MaterializerService {
    pub fn new(
        ledger_repository: Arc<dyn LedgerRepositoryTrait>,
        asset_repository: Arc<dyn AssetRepositoryTrait>,
        job_run_repository: Arc<dyn JobRunRepositoryTrait>,
    ) -> Self {
        Self {
            ledger_repository,
            asset_repository,
            job_run_repository,
        }
    }

    fn plan(&self, as_of: NaiveDate) -> Result<RunPlan> {
        let mut plan = RunPlan {
            report: MaterializeReport {
                run_date: Some(as_of),
                ..Default::default()
            },
            ..Default::default()
        };

        for (asset, deposit) in self.asset_repository.list_recurring_deposits()? {
            if deposit.amount <= Decimal::ZERO {
                continue;
            }
            self.plan_deposit(&asset, &deposit, as_of, &mut plan)?;
        }

        for (asset, loan) in self.asset_repository.list_loans()? {
            self.plan_loan(&asset, &loan, as_of, &mut plan)?;
        }

        Ok(plan)
    }

    /// Backfills every due deposit since the last materialized one.
    fn plan_deposit(
        &self,
        asset: &Asset,
        deposit: &RecurringDeposit,
        as_of: NaiveDate,
        plan: &mut RunPlan,
    ) -> Result<()> {
        let created = asset.created_at.date();
        let anchor = self
            .ledger_repository
            .latest_by_origin(asset.id, ORIGIN_AUTO_DCA)?
            .map(|e| e.value_date)
            .unwrap_or(created);
        let start = anchor.max(created);

        let rule = match RecurrenceRule::with_optional_day(
            deposit.frequency,
            deposit.anchor_day,
            anchor,
        ) {
            Ok(rule) => rule,
            Err(e) => {
                warn!("Skipping recurring deposit of asset {}: {}", asset.id, e);
                plan.report.failed += 1;
                plan.report.details.push(RunDetail {
                    scope: RunScope::Savings,
                    reason: DetailReason::InvalidConfiguration,
                    asset_id: asset.id,
                    asset_label: asset.label.clone(),
                    loan_id: None,
                    value_date: as_of,
                    period: period_of(as_of),
                    event_id: None,
                    error: Some(e.to_string()),
                });
                return Ok(());
            }
        };

        for due in rule.due_dates(start, as_of) {
            let period = period_of(due);
            let mut detail = RunDetail {
                scope: RunScope::Savings,
                reason: DetailReason::InsertedAutoDca,
                asset_id: asset.id,
                asset_label: asset.label.clone(),
                loan_id: None,
                value_date: due,
                period: period.clone(),
                event_id: None,
                error: None,
            };

            let key = IdempotencyKey::AutoDca {
                asset_id: asset.id,
                value_date: due,
            };
            if let Some(existing) = self.ledger_repository.find_by_idempotency_key(&key)? {
                debug!(
                    "auto_dca already materialized for asset {} on {} (event {})",
                    asset.id, due, existing.id
                );
                detail.reason = DetailReason::AlreadyExistsAutoDca;
                detail.event_id = Some(existing.id);
                plan.report.skipped += 1;
                plan.report.details.push(detail);
                continue;
            }

            let data = data_bag(json!({
                DATA_ORIGIN: ORIGIN_AUTO_DCA,
                "frequency": deposit.frequency.as_str(),
                "expected_day": rule.anchor_day,
                DATA_PERIOD: period,
            }));
            let event = NewLedgerEvent::posted(asset.user_id, asset.id, EventKind::CashOp, due)
                .with_amount(deposit.amount)
                .with_category(CATEGORY_DCA)
                .with_note(format!("Automatic deposit ({})", asset.label))
                .with_data(data);

            plan.groups.push(PlannedGroup {
                detail,
                events: vec![event],
            });
        }
        Ok(())
    }

    /// Installment due exactly on `as_of`, if any. Missed installments are not backfilled.
    fn plan_loan(&self, asset: &Asset, loan: &Loan, as_of: NaiveDate, plan: &mut RunPlan) -> Result<()> {
        let rule = RecurrenceRule::new(Frequency::Monthly, loan.start_date.day(), loan.start_date)?;
        if !rule.is_due_on(as_of) {
            return Ok(());
        }
        let elapsed = month_offset(loan.start_date, as_of);
        if elapsed < 0 || elapsed >= loan.duration_months as i64 {
            return Ok(());
        }
        let installment = loan.installment();
        if installment <= Decimal::ZERO {
            return Ok(());
        }

        let period = period_of(as_of);
        let mut detail = RunDetail {
            scope: RunScope::Loan,
            reason: DetailReason::InsertedAutoLoan,
            asset_id: asset.id,
            asset_label: asset.label.clone(),
            loan_id: Some(loan.id),
            value_date: as_of,
            period: period.clone(),
            event_id: None,
            error: None,
        };

        let key = IdempotencyKey::AutoLoan {
            asset_id: asset.id,
            loan_id: loan.id.to_string(),
            period: period.clone(),
        };
        if let Some(existing) = self.ledger_repository.find_by_idempotency_key(&key)? {
            debug!(
                "auto_loan already materialized for loan {} period {} (event {})",
                loan.id, period, existing.id
            );
            detail.reason = DetailReason::AlreadyExistsAutoLoan;
            detail.event_id = Some(existing.id);
            plan.report.skipped += 1;
            plan.report.details.push(detail);
            return Ok(());
        }

        let number = elapsed as i32 + 1;
        let row = amortization::schedule(
            loan.principal,
            loan.annual_rate,
            loan.duration_months,
            Some(installment),
        )
        .into_iter()
        .find(|r| r.number == number);

        let mut data = data_bag(json!({
            DATA_ORIGIN: ORIGIN_AUTO_LOAN,
            DATA_LOAN_ID: loan.id.to_string(),
            DATA_PERIOD: period,
            "installment": number,
        }));
        if let Some(row) = row {
            data.insert("interest".to_string(), json!(row.interest.to_string()));
            data.insert("principal".to_string(), json!(row.principal.to_string()));
        }
        let note = format!("Loan installment (#{})", loan.id);

        let events = match loan.pay_from_asset_id {
            Some(source_id) => {
                let owned = match self.asset_repository.get_asset(source_id) {
                    Ok(source) => source.user_id == asset.user_id,
                    Err(e) if e.is_not_found() => false,
                    Err(e) => return Err(e),
                };
                if !owned {
                    warn!(
                        "Loan {} pays from asset {} which the borrower does not own, skipping",
                        loan.id, source_id
                    );
                    plan.report.failed += 1;
                    detail.reason = DetailReason::InvalidConfiguration;
                    detail.error = Some(format!(
                        "Payment source {} is not owned by the borrower",
                        source_id
                    ));
                    plan.report.details.push(detail);
                    return Ok(());
                }
                transfer_pair(asset, source_id, as_of, installment, &data, &note)
            }
            None => vec![NewLedgerEvent::posted(
                asset.user_id,
                asset.id,
                EventKind::ExpenseChange,
                as_of,
            )
            .with_amount(installment)
            .with_category(CATEGORY_LOAN_PAYMENT)
            .with_note(note)
            .with_data(data)],
        };

        plan.groups.push(PlannedGroup { detail, events });
        Ok(())
    }
}

fn period_of(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn data_bag(value: serde_json::Value) -> EventData {
    match value {
        serde_json::Value::Object(map) => map,
        _ => EventData::new(),
    }
}

/// Debit on the paying asset, credit on the loan's asset, sharing one group id.
fn transfer_pair(
    loan_asset: &Asset,
    source_id: i64,
    value_date: NaiveDate,
    amount: Decimal,
    data: &EventData,
    note: &str,
) -> Vec<NewLedgerEvent> {
    let group_id = Uuid::new_v4().to_string();
    let half = |asset_id: i64, counterpart: i64, signed: Decimal| {
        let mut event =
            NewLedgerEvent::posted(loan_asset.user_id, asset_id, EventKind::Transfer, value_date)
                .with_amount(signed)
                .with_category(CATEGORY_LOAN_PAYMENT)
                .with_note(note)
                .with_data(data.clone());
        event.target_asset_id = Some(counterpart);
        event.transfer_group_id = Some(group_id.clone());
        event
    };
    vec![
        half(source_id, loan_asset.id, -amount.abs()),
        half(loan_asset.id, source_id, amount.abs()),
    ]
}

#[async_trait]
impl MaterializerServiceTrait for MaterializerService {
    fn preview(&self, as_of: NaiveDate) -> Result<MaterializeReport> {
        let plan = self.plan(as_of)?;
        let mut report = plan.report;
        for group in plan.groups {
            report.inserted += group.events.len();
            report.details.push(group.detail);
        }
        Ok(report)
    }

    async fn run_for_day(&self, as_of: NaiveDate) -> Result<MaterializeReport> {
        let plan = self.plan(as_of)?;
        let mut report = plan.report;
        if plan.groups.is_empty() {
            return Ok(report);
        }

        let (details, groups): (Vec<RunDetail>, Vec<Vec<NewLedgerEvent>>) = plan
            .groups
            .into_iter()
            .map(|g| (g.detail, g.events))
            .unzip();
        let outcome = self
            .ledger_repository
            .apply_batch(LedgerWriteBatch::events(groups, Vec::new()))
            .await?;

        for (mut detail, group) in details.into_iter().zip(outcome.groups) {
            match group {
                GroupOutcome::Inserted(ids) => {
                    report.inserted += ids.len();
                }
                GroupOutcome::Skipped { existing_id } => {
                    // Written by a concurrent run between planning and commit.
                    detail.reason = match detail.scope {
                        RunScope::Savings => DetailReason::AlreadyExistsAutoDca,
                        RunScope::Loan => DetailReason::AlreadyExistsAutoLoan,
                    };
                    detail.event_id = Some(existing_id);
                    report.skipped += 1;
                }
            }
            report.details.push(detail);
        }
        Ok(report)
    }

    async fn execute(&self, as_of: NaiveDate) -> Result<JobRun> {
        let previous = self
            .job_run_repository
            .list_for_date(MATERIALIZER_JOB_NAME, as_of)?;
        if previous.iter().any(|r| r.state == JobRunState::Done) {
            warn!(
                "Materializer already completed a run for {}; running again",
                as_of
            );
        }

        let mut run = self
            .job_run_repository
            .create(JobRun::start(MATERIALIZER_JOB_NAME, as_of))
            .await?;

        match self.run_for_day(as_of).await {
            Ok(report) => {
                info!(
                    "Materializer run for {}: inserted={} skipped={} failed={}",
                    as_of, report.inserted, report.skipped, report.failed
                );
                run.complete(
                    report.inserted as i64,
                    report.skipped as i64,
                    report.summary_message(None),
                );
                run.items_failed = report.failed as i64;
            }
            Err(e) => {
                error!("Materializer run for {} failed: {}", as_of, e);
                let report = MaterializeReport {
                    run_date: Some(as_of),
                    ..Default::default()
                };
                run.fail(0, 0, 0, report.summary_message(Some(&e.to_string())));
            }
        }

        self.job_run_repository.update(run).await
    }
}

