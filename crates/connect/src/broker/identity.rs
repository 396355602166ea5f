//! Stable identity of broker transactions across syncs.
//!
//! Records carrying a broker id are keyed `tr:<id>`. Records without one are
//! keyed by a SHA-256 over `(type, timestamp, label, isin, amount)`; two
//! distinct records with equal values in that tuple share an identity.

use sha2::{Digest, Sha256};

use super::models::BrokerTransaction;

/// Prefix naming the broker in identities.
pub const IDENTITY_SOURCE: &str = "tr";

const FIELD_SEPARATOR: u8 = 0x1f;

pub fn transaction_identity(tx: &BrokerTransaction) -> String {
    match tx.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("{}:{}", IDENTITY_SOURCE, id),
        None => content_hash(tx),
    }
}

/// Hex SHA-256 over the identifying fields.
pub fn content_hash(tx: &BrokerTransaction) -> String {
    let amount = tx.amount.map(|a| a.normalize().to_string());
    let label = tx.title.as_deref().or(tx.subtitle.as_deref());
    let fields = [
        tx.event_type.as_deref(),
        tx.timestamp.as_deref(),
        label,
        tx.isin.as_deref(),
        amount.as_deref(),
    ];

    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.unwrap_or_default().as_bytes());
        hasher.update([FIELD_SEPARATOR]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::models::normalize_transaction;
    use serde_json::json;

    #[test]
    fn broker_id_becomes_prefixed_identity() {
        let tx = normalize_transaction(&json!({"id": "abc-123", "eventType": "CREDIT"}));
        assert_eq!(transaction_identity(&tx), "tr:abc-123");
    }

    #[test]
    fn records_without_id_hash_their_content() {
        let a = normalize_transaction(&json!({
            "eventType": "INTEREST_PAYOUT",
            "timestamp": "2024-03-01T00:00:00Z",
            "title": "Interest",
            "amount": {"value": 3.10}
        }));
        let same = normalize_transaction(&json!({
            "eventType": "interest_payout",
            "timestamp": "2024-03-01T00:00:00Z",
            "title": "Interest",
            "amount": {"value": "3.1"}
        }));
        let other = normalize_transaction(&json!({
            "eventType": "INTEREST_PAYOUT",
            "timestamp": "2024-04-01T00:00:00Z",
            "title": "Interest",
            "amount": {"value": 3.10}
        }));

        let identity = transaction_identity(&a);
        assert_eq!(identity.len(), 64);
        assert_eq!(identity, transaction_identity(&same));
        assert_ne!(identity, transaction_identity(&other));
    }

    #[test]
    fn blank_id_falls_back_to_hash() {
        let tx = normalize_transaction(&json!({"id": "  ", "eventType": "CREDIT"}));
        assert!(!transaction_identity(&tx).starts_with("tr:"));
    }
}
