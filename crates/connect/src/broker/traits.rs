//! Traits defining the contract for broker operations.

use async_trait::async_trait;

use super::models::{BrokerPayload, BrokerPortfolio, ConnectChallenge};
use super::service::{ReconciliationReport, SyncOptions};
use patrimoine_core::brokers::BrokerLinkView;
use patrimoine_core::errors::Result;

/// Network client for the broker API.
///
/// Transport failures must surface as `ExternalError::BrokerUnavailable`
/// (retryable) and refusals as `ExternalError::BrokerRejected`.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Starts a login. The broker sends a 2FA code to the phone.
    async fn connect(&self, phone: &str, pin: &str) -> Result<ConnectChallenge>;

    /// Completes a login and returns the session token.
    async fn validate_2fa(&self, process_id: &str, code: &str) -> Result<String>;

    /// Cash, accounts with positions, and the transaction timeline.
    async fn fetch(&self, session_token: &str) -> Result<BrokerPayload>;
}

/// Trait for turning broker data into ledger events.
#[async_trait]
pub trait ReconciliationServiceTrait: Send + Sync {
    /// Upserts the snapshot into `asset_id`. A dry run writes nothing.
    async fn reconcile(
        &self,
        user_id: i64,
        asset_id: i64,
        portfolio: &BrokerPortfolio,
        options: SyncOptions,
    ) -> Result<ReconciliationReport>;
}

/// Trait for saved broker credentials and login.
#[async_trait]
pub trait BrokerSessionServiceTrait: Send + Sync {
    fn get_link(&self, user_id: i64) -> Result<Option<BrokerLinkView>>;

    async fn save_link(
        &self,
        user_id: i64,
        phone: String,
        pin: Option<String>,
        remember_pin: bool,
    ) -> Result<BrokerLinkView>;

    async fn delete_link(&self, user_id: i64) -> Result<bool>;

    /// Starts a login, filling missing phone and PIN from the saved link.
    async fn connect(
        &self,
        user_id: i64,
        phone: Option<String>,
        pin: Option<String>,
    ) -> Result<ConnectChallenge>;

    async fn validate_2fa(&self, process_id: &str, code: &str) -> Result<String>;
}
