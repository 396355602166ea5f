use std::sync::Arc;

use chrono_tz::Tz;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::{Config, LogFormat},
    secrets::build_secret_cipher,
};
use patrimoine_connect::{
    BrokerClient, BrokerSessionService, ReconciliationService, ReconciliationServiceTrait,
    SyncOrchestrator,
};
use patrimoine_core::{
    assets::AssetRepositoryTrait,
    balances::{BalanceService, BalanceServiceTrait},
    brokers::BrokerLinkRepositoryTrait,
    ledger::{LedgerService, LedgerServiceTrait},
    schedules::{JobRunRepositoryTrait, MaterializerService, MaterializerServiceTrait},
    secrets::SecretCipher,
    transfers::{TransferService, TransferServiceTrait},
};
use patrimoine_storage_sqlite::{
    db, AssetRepository, BrokerLinkRepository, JobRunRepository, LedgerRepository,
    ProductCatalogRepository,
};

/// Services and repositories shared by the scheduler and the request layer.
pub struct AppState {
    pub ledger_service: Arc<dyn LedgerServiceTrait>,
    pub transfer_service: Arc<dyn TransferServiceTrait>,
    pub materializer_service: Arc<dyn MaterializerServiceTrait>,
    pub balance_service: Arc<dyn BalanceServiceTrait>,
    pub reconciliation_service: Arc<dyn ReconciliationServiceTrait>,
    pub asset_repository: Arc<dyn AssetRepositoryTrait>,
    pub job_run_repository: Arc<dyn JobRunRepositoryTrait>,
    pub broker_link_repository: Arc<dyn BrokerLinkRepositoryTrait>,
    /// `None` when no secret key is configured.
    pub secret_cipher: Option<Arc<dyn SecretCipher>>,
    pub timezone: Tz,
    pub db_path: String,
}

impl AppState {
    /// Credential and session handling against the given broker client.
    pub fn broker_session(&self, client: Arc<dyn BrokerClient>) -> BrokerSessionService {
        BrokerSessionService::new(
            self.broker_link_repository.clone(),
            client,
            self.secret_cipher.clone(),
        )
    }

    pub fn sync_orchestrator(&self, client: Arc<dyn BrokerClient>) -> SyncOrchestrator {
        SyncOrchestrator::new(client, self.reconciliation_service.clone())
    }
}

/// Installs the global subscriber. `log` records from the library crates are
/// forwarded through the subscriber's log bridge.
pub fn init_tracing(log_format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init(),
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    db::prepare_database(&config.db_path)?;
    tracing::info!("Database path in use: {}", config.db_path);

    let secret_cipher = build_secret_cipher(config.secret_key.as_deref())?;
    if secret_cipher.is_none() {
        tracing::warn!("PATRIMOINE_SECRET_KEY not set; broker PINs cannot be remembered");
    }

    let pool = db::create_pool(&config.db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone());

    let ledger_repository = Arc::new(LedgerRepository::new(pool.clone(), writer.clone()));
    let asset_repository = Arc::new(AssetRepository::new(pool.clone(), writer.clone()));
    let catalog_repository = Arc::new(ProductCatalogRepository::new(pool.clone(), writer.clone()));
    let job_run_repository = Arc::new(JobRunRepository::new(pool.clone(), writer.clone()));
    let broker_link_repository = Arc::new(BrokerLinkRepository::new(pool.clone(), writer));

    let ledger_service = Arc::new(LedgerService::new(
        ledger_repository.clone(),
        asset_repository.clone(),
        catalog_repository.clone(),
    ));
    let transfer_service = Arc::new(TransferService::new(
        ledger_repository.clone(),
        asset_repository.clone(),
    ));
    let materializer_service = Arc::new(MaterializerService::new(
        ledger_repository.clone(),
        asset_repository.clone(),
        job_run_repository.clone(),
    ));
    let balance_service = Arc::new(BalanceService::new(
        ledger_repository.clone(),
        asset_repository.clone(),
    ));
    let reconciliation_service = Arc::new(ReconciliationService::new(
        ledger_repository,
        asset_repository.clone(),
        catalog_repository,
    ));

    Ok(Arc::new(AppState {
        ledger_service,
        transfer_service,
        materializer_service,
        balance_service,
        reconciliation_service,
        asset_repository,
        job_run_repository,
        broker_link_repository,
        secret_cipher,
        timezone: config.timezone,
        db_path: config.db_path.clone(),
    }))
}
