use async_trait::async_trait;

use super::brokers_model::{BrokerLink, NewBrokerLink};
use crate::errors::Result;

#[async_trait]
pub trait BrokerLinkRepositoryTrait: Send + Sync {
    fn get_link(&self, user_id: i64, broker: &str) -> Result<Option<BrokerLink>>;
    /// Creates or replaces the link for `(user_id, broker)`.
    async fn upsert_link(&self, link: NewBrokerLink) -> Result<BrokerLink>;
    /// Returns whether a link existed.
    async fn delete_link(&self, user_id: i64, broker: &str) -> Result<bool>;
}
