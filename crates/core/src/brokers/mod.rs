//! Stored broker credentials.

mod brokers_model;
mod brokers_traits;

pub use brokers_model::{mask_phone, BrokerLink, BrokerLinkView, NewBrokerLink};
pub use brokers_traits::BrokerLinkRepositoryTrait;
