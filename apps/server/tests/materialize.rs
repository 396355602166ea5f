use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tempfile::tempdir;

use patrimoine_connect::broker::BROKER_NAME;
use patrimoine_connect::{BrokerClient, BrokerPayload, BrokerSessionServiceTrait, ConnectChallenge};
use patrimoine_core::assets::{AssetKind, NewAsset, RecurringDeposit};
use patrimoine_core::recurrence::Frequency;
use patrimoine_core::schedules::JobRunState;
use patrimoine_core::Result;
use patrimoine_server::{build_state, config::Config, scheduler, AppState};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

async fn state_in(dir: &std::path::Path, secret_key: Option<String>) -> Arc<AppState> {
    let db_path = dir.join("patrimoine.db").to_string_lossy().into_owned();
    let config = Config::from_lookup(|name| match name {
        "PATRIMOINE_DB_PATH" => Some(db_path.clone()),
        "PATRIMOINE_SECRET_KEY" => secret_key.clone(),
        _ => None,
    })
    .unwrap();
    build_state(&config).await.unwrap()
}

async fn savings_with_monthly_deposit(state: &AppState) -> i64 {
    let asset = state
        .asset_repository
        .create_asset(NewAsset {
            user_id: 1,
            kind: AssetKind::Savings,
            label: "Livret A".into(),
            current_value: Some(dec!(1000)),
            created_at: Some(d(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap()),
        })
        .await
        .unwrap();
    state
        .asset_repository
        .set_recurring_deposit(RecurringDeposit {
            asset_id: asset.id,
            amount: dec!(100),
            frequency: Frequency::Monthly,
            anchor_day: Some(5),
        })
        .await
        .unwrap();
    asset.id
}

#[tokio::test]
async fn daily_run_backfills_once_and_is_recorded() {
    let tmp = tempdir().unwrap();
    let state = state_in(tmp.path(), None).await;
    let asset_id = savings_with_monthly_deposit(&state).await;

    let first = scheduler::run_materializer(&state, d(2024, 3, 10)).await.unwrap();
    assert_eq!(first.state, JobRunState::Done);
    assert_eq!(first.items_inserted, 3);

    let second = scheduler::run_materializer(&state, d(2024, 3, 10)).await.unwrap();
    assert_eq!(second.state, JobRunState::Done);
    assert_eq!(second.items_inserted, 0);

    let runs = state
        .job_run_repository
        .list_for_date("auto-events", d(2024, 3, 10))
        .unwrap();
    assert_eq!(runs.len(), 2);

    let balance = state
        .balance_service
        .effective_balance(1, asset_id, d(2024, 3, 10))
        .unwrap();
    assert_eq!(balance.effective, dec!(1300));
}

struct NoopClient;

#[async_trait]
impl BrokerClient for NoopClient {
    async fn connect(&self, _phone: &str, _pin: &str) -> Result<ConnectChallenge> {
        Ok(ConnectChallenge {
            process_id: "p-1".into(),
            countdown_seconds: 30,
        })
    }

    async fn validate_2fa(&self, _process_id: &str, _code: &str) -> Result<String> {
        Ok("session".into())
    }

    async fn fetch(&self, _session_token: &str) -> Result<BrokerPayload> {
        Ok(BrokerPayload::default())
    }
}

#[tokio::test]
async fn remembered_pin_is_stored_encrypted() {
    let tmp = tempdir().unwrap();
    let state = state_in(tmp.path(), Some(BASE64.encode([9u8; 32]))).await;
    let sessions = state.broker_session(Arc::new(NoopClient));

    let view = sessions
        .save_link(1, "+33612345678".into(), Some("1234".into()), true)
        .await
        .unwrap();
    assert_eq!(view.phone_masked, "+336******78");
    assert!(view.has_pin);

    let stored = state.broker_link_repository.get_link(1, BROKER_NAME).unwrap().unwrap();
    let pin_enc = stored.pin_enc.unwrap();
    assert_ne!(pin_enc, "1234");
    assert_eq!(state.secret_cipher.as_ref().unwrap().decrypt(&pin_enc).unwrap(), "1234");

    let challenge = sessions.connect(1, None, None).await.unwrap();
    assert_eq!(challenge.process_id, "p-1");
}

#[tokio::test]
async fn remembering_a_pin_without_key_is_refused() {
    let tmp = tempdir().unwrap();
    let state = state_in(tmp.path(), None).await;
    let sessions = state.broker_session(Arc::new(NoopClient));

    let err = sessions
        .save_link(1, "+33612345678".into(), Some("1234".into()), true)
        .await
        .unwrap_err();
    assert!(matches!(err, patrimoine_core::Error::Secret(_)));
}
