use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use crate::assets::AssetKind;
use crate::ledger::{
    EventKind, EventStatus, LedgerEventInput, LedgerEventUpdate, LedgerService,
    LedgerServiceTrait,
};
use crate::testing::{InMemoryAssetRepository, InMemoryCatalog, InMemoryLedgerRepository};
use crate::transfers::{NewTransfer, TransferService, TransferServiceTrait};

const USER: i64 = 1;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct Fixture {
    transfers: TransferService,
    ledger_service: LedgerService,
    ledger: Arc<InMemoryLedgerRepository>,
    checking: i64,
    savings: i64,
    foreign: i64,
}

fn fixture() -> Fixture {
    let ledger = Arc::new(InMemoryLedgerRepository::new());
    let assets = Arc::new(InMemoryAssetRepository::new());
    let checking = assets
        .add_asset(USER, AssetKind::Savings, "Compte courant", Some(dec!(2000)), d(2024, 1, 1))
        .id;
    let savings = assets
        .add_asset(USER, AssetKind::Savings, "Livret A", Some(dec!(0)), d(2024, 1, 1))
        .id;
    let foreign = assets
        .add_asset(2, AssetKind::Savings, "Someone else", None, d(2024, 1, 1))
        .id;
    Fixture {
        transfers: TransferService::new(ledger.clone(), assets.clone()),
        ledger_service: LedgerService::new(
            ledger.clone(),
            assets,
            Arc::new(InMemoryCatalog::default()),
        ),
        ledger,
        checking,
        savings,
        foreign,
    }
}

#[tokio::test]
async fn creates_a_balanced_pair() {
    let f = fixture();
    let result = f
        .transfers
        .create_transfer(USER, NewTransfer::new(f.checking, f.savings, dec!(250), d(2024, 5, 3)))
        .await
        .unwrap();

    let group = f.transfers.get_transfer_group(USER, &result.group_id).unwrap();
    assert_eq!(group.len(), 2);
    let debit = group.iter().find(|e| e.id == result.debit_id).unwrap();
    let credit = group.iter().find(|e| e.id == result.credit_id).unwrap();

    assert_eq!(debit.amount, Some(dec!(-250)));
    assert_eq!(credit.amount, Some(dec!(250)));
    assert_eq!(debit.asset_id, f.checking);
    assert_eq!(debit.target_asset_id, Some(f.savings));
    assert_eq!(credit.asset_id, f.savings);
    assert_eq!(credit.target_asset_id, Some(f.checking));
    assert_eq!(debit.value_date, credit.value_date);
    assert!(group.iter().all(|e| e.kind == EventKind::Transfer));
    assert!(group.iter().all(|e| e.status == EventStatus::Posted));
}

#[tokio::test]
async fn rejects_invalid_transfers_without_writing() {
    let f = fixture();
    let date = d(2024, 5, 3);

    for bad in [
        NewTransfer::new(f.checking, f.savings, dec!(0), date),
        NewTransfer::new(f.checking, f.savings, dec!(-5), date),
        NewTransfer::new(f.checking, f.checking, dec!(5), date),
        NewTransfer::new(f.checking, f.foreign, dec!(5), date),
        NewTransfer::new(f.checking, 999, dec!(5), date),
    ] {
        let err = f.transfers.create_transfer(USER, bad).await.unwrap_err();
        assert!(err.is_validation(), "unexpected error: {err}");
    }
    assert!(f.ledger.all_events().is_empty());
}

#[tokio::test]
async fn failed_store_leaves_no_half_transfer() {
    let f = fixture();
    f.ledger.fail_writes(true);
    assert!(f
        .transfers
        .create_transfer(USER, NewTransfer::new(f.checking, f.savings, dec!(5), d(2024, 5, 3)))
        .await
        .is_err());
    assert!(f.ledger.all_events().is_empty());
}

#[tokio::test]
async fn cascaded_update_keeps_signs_and_shared_fields() {
    let f = fixture();
    let t = f
        .transfers
        .create_transfer(USER, NewTransfer::new(f.checking, f.savings, dec!(100), d(2024, 5, 3)))
        .await
        .unwrap();

    let patch = LedgerEventUpdate {
        amount: Some(Some(dec!(-140))),
        value_date: Some(d(2024, 5, 4)),
        note: Some(Some("Épargne de précaution".to_string())),
        ..Default::default()
    };
    f.transfers
        .update_transfer(USER, t.credit_id, patch, true)
        .await
        .unwrap();

    let group = f.transfers.get_transfer_group(USER, &t.group_id).unwrap();
    let debit = group.iter().find(|e| e.id == t.debit_id).unwrap();
    let credit = group.iter().find(|e| e.id == t.credit_id).unwrap();
    assert_eq!(debit.amount, Some(dec!(-140)));
    assert_eq!(credit.amount, Some(dec!(140)));
    assert!(group.iter().all(|e| e.value_date == d(2024, 5, 4)));
    assert!(group
        .iter()
        .all(|e| e.note.as_deref() == Some("Épargne de précaution")));
}

#[tokio::test]
async fn update_without_cascade_touches_one_half_only() {
    let f = fixture();
    let t = f
        .transfers
        .create_transfer(USER, NewTransfer::new(f.checking, f.savings, dec!(100), d(2024, 5, 3)))
        .await
        .unwrap();

    let patch = LedgerEventUpdate {
        amount: Some(Some(dec!(-90))),
        ..Default::default()
    };
    f.ledger_service
        .update_event(USER, t.debit_id, patch, false)
        .await
        .unwrap();

    let group = f.transfers.get_transfer_group(USER, &t.group_id).unwrap();
    let debit = group.iter().find(|e| e.id == t.debit_id).unwrap();
    let credit = group.iter().find(|e| e.id == t.credit_id).unwrap();
    assert_eq!(debit.amount, Some(dec!(-90)));
    assert_eq!(credit.amount, Some(dec!(100)));
}

#[tokio::test]
async fn cascade_delete_removes_both_halves() {
    let f = fixture();
    let t = f
        .transfers
        .create_transfer(USER, NewTransfer::new(f.checking, f.savings, dec!(100), d(2024, 5, 3)))
        .await
        .unwrap();

    let removed = f
        .ledger_service
        .delete_event(USER, t.credit_id, true)
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(f.transfers.get_transfer_group(USER, &t.group_id).unwrap().is_empty());
}

#[tokio::test]
async fn delete_without_cascade_leaves_an_orphan() {
    let f = fixture();
    let t = f
        .transfers
        .create_transfer(USER, NewTransfer::new(f.checking, f.savings, dec!(100), d(2024, 5, 3)))
        .await
        .unwrap();

    let removed = f
        .transfers
        .delete_transfer(USER, t.debit_id, false)
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let remaining = f.transfers.get_transfer_group(USER, &t.group_id).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, t.credit_id);
}

#[tokio::test]
async fn transfer_operations_refuse_plain_events() {
    let f = fixture();
    let plain = f
        .ledger_service
        .create_event(
            USER,
            LedgerEventInput {
                asset_id: f.checking,
                kind: Some("cash_op".to_string()),
                value_date: Some("2024-05-01".to_string()),
                amount: Some(dec!(10)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = f
        .transfers
        .delete_transfer(USER, plain.id, true)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}
