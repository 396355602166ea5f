//! Broker sync orchestrator: fetch, normalize, reconcile.

use std::sync::Arc;

use log::{error, info};

use super::models::BrokerPortfolio;
use super::service::{ReconciliationReport, SyncOptions};
use super::traits::{BrokerClient, ReconciliationServiceTrait};
use patrimoine_core::errors::Result;

/// Runs one broker sync for a target asset.
///
/// A failed fetch is returned as is (broker outages are retryable) and
/// nothing is written.
pub struct SyncOrchestrator {
    client: Arc<dyn BrokerClient>,
    reconciler: Arc<dyn ReconciliationServiceTrait>,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<dyn BrokerClient>,
        reconciler: Arc<dyn ReconciliationServiceTrait>,
    ) -> Self {
        Self { client, reconciler }
    }

    /// Fetches and normalizes the broker snapshot without touching the ledger.
    pub async fn fetch_portfolio(&self, session_token: &str) -> Result<BrokerPortfolio> {
        let payload = self.client.fetch(session_token).await.map_err(|e| {
            error!("Broker fetch failed: {}", e);
            e
        })?;
        let portfolio = payload.normalize();
        info!(
            "Fetched {} broker accounts and {} transactions",
            portfolio.accounts.len(),
            portfolio.transactions.len()
        );
        Ok(portfolio)
    }

    pub async fn sync(
        &self,
        user_id: i64,
        asset_id: i64,
        session_token: &str,
        options: SyncOptions,
    ) -> Result<ReconciliationReport> {
        info!("Starting broker sync for asset {}", asset_id);
        let portfolio = self.fetch_portfolio(session_token).await?;
        self.reconciler
            .reconcile(user_id, asset_id, &portfolio, options)
            .await
    }
}
