use async_trait::async_trait;

use super::transfers_model::{NewTransfer, TransferResult};
use crate::errors::Result;
use crate::ledger::{LedgerEvent, LedgerEventUpdate};

#[async_trait]
pub trait TransferServiceTrait: Send + Sync {
    /// Both halves of the transfer, ordered by `(value_date, id)`.
    fn get_transfer_group(&self, user_id: i64, group_id: &str) -> Result<Vec<LedgerEvent>>;

    async fn create_transfer(&self, user_id: i64, transfer: NewTransfer) -> Result<TransferResult>;

    /// Patches the transfer half `event_id`. With `cascade` the sibling receives
    /// the shared fields and the new magnitude under its own sign.
    async fn update_transfer(
        &self,
        user_id: i64,
        event_id: i64,
        patch: LedgerEventUpdate,
        cascade: bool,
    ) -> Result<Vec<LedgerEvent>>;

    /// Deletes the half `event_id`, or both halves with `cascade`.
    async fn delete_transfer(&self, user_id: i64, event_id: i64, cascade: bool) -> Result<usize>;
}
