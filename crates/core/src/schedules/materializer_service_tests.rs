use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use crate::assets::{AssetKind, NewLoan, RecurringDeposit};
use crate::ledger::{EventKind, EventQuery, LedgerRepositoryTrait, ORIGIN_AUTO_DCA};
use crate::recurrence::Frequency;
use crate::schedules::{
    DetailReason, JobRunState, MaterializerService, MaterializerServiceTrait,
};
use crate::testing::{InMemoryAssetRepository, InMemoryJobRunRepository, InMemoryLedgerRepository};

const USER: i64 = 1;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct Fixture {
    service: MaterializerService,
    ledger: Arc<InMemoryLedgerRepository>,
    assets: Arc<InMemoryAssetRepository>,
    jobs: Arc<InMemoryJobRunRepository>,
}

fn fixture() -> Fixture {
    let ledger = Arc::new(InMemoryLedgerRepository::new());
    let assets = Arc::new(InMemoryAssetRepository::new());
    let jobs = Arc::new(InMemoryJobRunRepository::new());
    Fixture {
        service: MaterializerService::new(ledger.clone(), assets.clone(), jobs.clone()),
        ledger,
        assets,
        jobs,
    }
}

fn monthly_deposit(f: &Fixture, created: NaiveDate, day: i32) -> i64 {
    let asset = f
        .assets
        .add_asset(USER, AssetKind::Savings, "Livret A", Some(dec!(1000)), created);
    f.assets.add_deposit(RecurringDeposit {
        asset_id: asset.id,
        amount: dec!(50),
        frequency: Frequency::Monthly,
        anchor_day: Some(day),
    });
    asset.id
}

#[tokio::test]
async fn backfills_missed_deposits_then_is_idempotent() {
    let f = fixture();
    let asset_id = monthly_deposit(&f, d(2024, 1, 10), 15);

    let first = f.service.run_for_day(d(2024, 4, 20)).await.unwrap();
    assert_eq!(first.inserted, 4);
    assert_eq!(first.skipped, 0);

    let events = f
        .ledger
        .query_events(USER, &EventQuery::for_asset(asset_id))
        .unwrap();
    let dates: Vec<NaiveDate> = events.iter().map(|e| e.value_date).collect();
    assert_eq!(
        dates,
        vec![d(2024, 1, 15), d(2024, 2, 15), d(2024, 3, 15), d(2024, 4, 15)]
    );
    let first_event = &events[0];
    assert_eq!(first_event.kind, EventKind::CashOp);
    assert_eq!(first_event.amount, Some(dec!(50)));
    assert_eq!(first_event.category.as_deref(), Some("dca"));
    assert_eq!(first_event.origin(), Some(ORIGIN_AUTO_DCA));
    assert_eq!(first_event.data_str("period"), Some("2024-01"));
    assert_eq!(first_event.data_str("frequency"), Some("monthly"));
    assert_eq!(first_event.data["expected_day"], 15);

    let rerun = f.service.run_for_day(d(2024, 4, 20)).await.unwrap();
    assert_eq!(rerun.inserted, 0);
    assert_eq!(f.ledger.all_events().len(), 4);
    assert!(rerun
        .details
        .iter()
        .all(|detail| detail.reason == DetailReason::AlreadyExistsAutoDca));
}

#[tokio::test]
async fn later_run_resumes_from_last_occurrence() {
    let f = fixture();
    monthly_deposit(&f, d(2024, 1, 1), 31);

    f.service.run_for_day(d(2024, 2, 10)).await.unwrap();
    let report = f.service.run_for_day(d(2024, 5, 1)).await.unwrap();

    assert_eq!(report.inserted, 3);
    let dates: Vec<NaiveDate> = f.ledger.all_events().iter().map(|e| e.value_date).collect();
    assert_eq!(
        dates,
        vec![d(2024, 1, 31), d(2024, 2, 29), d(2024, 3, 31), d(2024, 4, 30)]
    );
}

fn deposit_every(f: &Fixture, frequency: Frequency, created: NaiveDate, day: i32) -> i64 {
    let asset = f
        .assets
        .add_asset(USER, AssetKind::Savings, "PEL", Some(dec!(0)), created);
    f.assets.add_deposit(RecurringDeposit {
        asset_id: asset.id,
        amount: dec!(300),
        frequency,
        anchor_day: Some(day),
    });
    asset.id
}

fn deposit_dates(f: &Fixture, asset_id: i64) -> Vec<NaiveDate> {
    f.ledger
        .query_events(USER, &EventQuery::for_asset(asset_id))
        .unwrap()
        .iter()
        .map(|e| e.value_date)
        .collect()
}

#[tokio::test]
async fn quarterly_deposit_keeps_its_phase_across_runs() {
    let f = fixture();
    let asset_id = deposit_every(&f, Frequency::Quarterly, d(2024, 1, 10), 31);

    let first = f.service.run_for_day(d(2024, 5, 1)).await.unwrap();
    assert_eq!((first.inserted, first.skipped), (2, 0));

    // Resumes from the clamped April 30th without drifting to the 30th.
    let second = f.service.run_for_day(d(2024, 11, 15)).await.unwrap();
    assert_eq!((second.inserted, second.skipped), (2, 1));

    let third = f.service.run_for_day(d(2025, 2, 3)).await.unwrap();
    assert_eq!((third.inserted, third.skipped), (1, 1));

    assert_eq!(
        deposit_dates(&f, asset_id),
        vec![
            d(2024, 1, 31),
            d(2024, 4, 30),
            d(2024, 7, 31),
            d(2024, 10, 31),
            d(2025, 1, 31),
        ]
    );
}

#[tokio::test]
async fn yearly_deposit_returns_to_leap_day_after_clamped_years() {
    let f = fixture();
    let asset_id = deposit_every(&f, Frequency::Yearly, d(2024, 2, 1), 29);

    let first = f.service.run_for_day(d(2024, 3, 1)).await.unwrap();
    assert_eq!(first.inserted, 1);

    let second = f.service.run_for_day(d(2026, 3, 1)).await.unwrap();
    assert_eq!((second.inserted, second.skipped), (2, 1));

    let third = f.service.run_for_day(d(2028, 2, 29)).await.unwrap();
    assert_eq!((third.inserted, third.skipped), (2, 1));

    let rerun = f.service.run_for_day(d(2028, 2, 29)).await.unwrap();
    assert_eq!(rerun.inserted, 0);

    assert_eq!(
        deposit_dates(&f, asset_id),
        vec![
            d(2024, 2, 29),
            d(2025, 2, 28),
            d(2026, 2, 28),
            d(2027, 2, 28),
            d(2028, 2, 29),
        ]
    );
}

#[tokio::test]
async fn preview_writes_nothing() {
    let f = fixture();
    monthly_deposit(&f, d(2024, 1, 1), 5);

    let preview = f.service.preview(d(2024, 3, 5)).unwrap();
    assert_eq!(preview.inserted, 3);
    assert!(f.ledger.all_events().is_empty());
}

#[tokio::test]
async fn loan_with_payment_source_creates_a_transfer_pair() {
    let f = fixture();
    let checking = f
        .assets
        .add_asset(USER, AssetKind::Savings, "Compte courant", None, d(2023, 1, 1));
    let flat = f
        .assets
        .add_asset(USER, AssetKind::RealEstate, "Appartement", None, d(2023, 1, 1));
    let loan = f.assets.add_loan(NewLoan {
        asset_id: flat.id,
        principal: dec!(200000),
        annual_rate: dec!(3.5),
        duration_months: 240,
        start_date: d(2023, 3, 31),
        monthly_payment: None,
        pay_from_asset_id: Some(checking.id),
    });

    // Not due: wrong day of month.
    let report = f.service.run_for_day(d(2024, 2, 28)).await.unwrap();
    assert_eq!(report.inserted, 0);

    // Day 31 clamps to Feb 29 in 2024.
    let report = f.service.run_for_day(d(2024, 2, 29)).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.details[0].reason, DetailReason::InsertedAutoLoan);
    assert_eq!(report.details[0].loan_id, Some(loan.id));

    let events = f.ledger.all_events();
    assert_eq!(events.len(), 2);
    let debit = events.iter().find(|e| e.asset_id == checking.id).unwrap();
    let credit = events.iter().find(|e| e.asset_id == flat.id).unwrap();
    assert_eq!(debit.kind, EventKind::Transfer);
    assert_eq!(debit.amount, Some(dec!(-1159.92)));
    assert_eq!(credit.amount, Some(dec!(1159.92)));
    assert_eq!(debit.transfer_group_id, credit.transfer_group_id);
    assert!(debit.transfer_group_id.is_some());
    assert_eq!(credit.data_str("loan_id"), Some(loan.id.to_string().as_str()));
    assert_eq!(credit.data_str("period"), Some("2024-02"));
    assert_eq!(credit.data["installment"], 12);

    let rerun = f.service.run_for_day(d(2024, 2, 29)).await.unwrap();
    assert_eq!(rerun.inserted, 0);
    assert_eq!(rerun.skipped, 1);
    assert_eq!(rerun.details[0].reason, DetailReason::AlreadyExistsAutoLoan);
    assert_eq!(f.ledger.all_events().len(), 2);
}

#[tokio::test]
async fn loan_without_source_is_an_expense_and_stops_after_duration() {
    let f = fixture();
    let flat = f
        .assets
        .add_asset(USER, AssetKind::RealEstate, "Studio", None, d(2023, 1, 1));
    f.assets.add_loan(NewLoan {
        asset_id: flat.id,
        principal: dec!(1200),
        annual_rate: dec!(0),
        duration_months: 12,
        start_date: d(2024, 1, 10),
        monthly_payment: Some(dec!(100)),
        pay_from_asset_id: None,
    });

    let report = f.service.run_for_day(d(2024, 1, 10)).await.unwrap();
    assert_eq!(report.inserted, 1);
    let event = &f.ledger.all_events()[0];
    assert_eq!(event.kind, EventKind::ExpenseChange);
    assert_eq!(event.amount, Some(dec!(100)));
    assert_eq!(event.category.as_deref(), Some("loan_payment"));

    // Thirteenth month is past the loan's duration; earlier months are never backfilled.
    let report = f.service.run_for_day(d(2025, 1, 10)).await.unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(f.ledger.all_events().len(), 1);
}

#[tokio::test]
async fn execute_records_the_job_run() {
    let f = fixture();
    monthly_deposit(&f, d(2024, 1, 1), 1);

    let run = f.service.execute(d(2024, 2, 1)).await.unwrap();
    assert_eq!(run.state, JobRunState::Done);
    assert_eq!(run.ok, Some(true));
    assert_eq!(run.items_inserted, 2);
    assert!(run.finished_at.is_some());
    let message: serde_json::Value = serde_json::from_str(run.message.as_deref().unwrap()).unwrap();
    assert_eq!(message["stats"]["inserted"], 2);
    assert_eq!(message["details"][0]["reason"], "inserted_auto_dca");

    let again = f.service.execute(d(2024, 2, 1)).await.unwrap();
    assert_eq!(again.items_inserted, 0);
    assert_eq!(again.items_skipped, 1);
    assert_eq!(f.jobs.all_runs().len(), 2);
}

#[tokio::test]
async fn failed_run_is_recorded_and_rolled_back() {
    let f = fixture();
    monthly_deposit(&f, d(2024, 1, 1), 1);
    f.ledger.fail_writes(true);

    let run = f.service.execute(d(2024, 3, 1)).await.unwrap();
    assert_eq!(run.state, JobRunState::Error);
    assert_eq!(run.ok, Some(false));
    assert!(run.message.as_deref().unwrap().contains("database is locked"));
    assert!(f.ledger.all_events().is_empty());
}

#[tokio::test]
async fn invalid_anchor_day_is_counted_as_failed() {
    let f = fixture();
    let asset = f
        .assets
        .add_asset(USER, AssetKind::Savings, "Livret", None, d(2024, 1, 1));
    f.assets.add_deposit(RecurringDeposit {
        asset_id: asset.id,
        amount: dec!(10),
        frequency: Frequency::Quarterly,
        anchor_day: Some(42),
    });
    monthly_deposit(&f, d(2024, 1, 1), 1);

    let report = f.service.run_for_day(d(2024, 1, 31)).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.inserted, 1);
}
