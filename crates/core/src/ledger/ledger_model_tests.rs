use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::json;

use super::*;

fn event() -> LedgerEvent {
    NewLedgerEvent::posted(1, 10, EventKind::CashOp, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        .with_amount(dec!(100))
        .with_note("Salary")
        .into_event(5, chrono::Utc::now().naive_utc())
}

#[test]
fn kinds_round_trip_through_their_wire_names() {
    for kind in EventKind::ALL {
        assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        let json = serde_json::to_value(kind).unwrap();
        assert_eq!(json, json!(kind.as_str()));
    }
    assert!("cash-op".parse::<EventKind>().is_err());
    assert!("posted ".parse::<EventStatus>().is_ok());
    assert!("archived".parse::<EventStatus>().is_err());
}

#[test]
fn patch_distinguishes_absent_from_null() {
    let patch: LedgerEventUpdate =
        serde_json::from_value(json!({"note": null, "amount": 42.5})).unwrap();
    assert_eq!(patch.note, Some(None));
    assert_eq!(patch.amount, Some(Some(dec!(42.5))));
    assert_eq!(patch.category, None);

    let mut e = event();
    assert!(patch.apply_to(&mut e));
    assert_eq!(e.note, None);
    assert_eq!(e.amount, Some(dec!(42.5)));
    assert_eq!(e.kind, EventKind::CashOp);
}

#[test]
fn patch_with_identical_values_reports_no_change() {
    let mut e = event();
    let patch = LedgerEventUpdate {
        amount: Some(Some(dec!(100))),
        note: Some(Some("Salary".to_string())),
        ..Default::default()
    };
    assert!(!patch.apply_to(&mut e));
    assert!(LedgerEventUpdate::default().is_empty());
    assert!(!patch.is_empty());
}

#[test]
fn query_filters_by_window_and_status() {
    let e = event();
    let mut q = EventQuery::for_asset(10);
    assert!(q.matches(&e));
    q.date_to = NaiveDate::from_ymd_opt(2024, 2, 29);
    assert!(!q.matches(&e));
    q.date_to = None;
    q.statuses = Some(vec![EventStatus::Cancelled]);
    assert!(!q.matches(&e));
    assert!(!EventQuery::for_asset(11).matches(&e));
    assert!(!EventQuery::for_transfer_group("g").matches(&e));
}

#[test]
fn batch_outcome_counts() {
    let outcome = BatchOutcome {
        groups: vec![
            GroupOutcome::Inserted(vec![1, 2]),
            GroupOutcome::Skipped { existing_id: 9 },
            GroupOutcome::Inserted(vec![3]),
        ],
        updated: 0,
        ..Default::default()
    };
    assert_eq!(outcome.inserted_events(), 3);
    assert_eq!(outcome.skipped_groups(), 1);
}
