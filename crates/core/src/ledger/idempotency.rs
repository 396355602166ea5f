//! Idempotency keys carried by generated and imported events.
//!
//! Every event produced by the materializer or the reconciliation engine
//! carries enough information in its `data` bag to derive exactly one key.
//! Stores must refuse to hold two events with the same key.

use chrono::NaiveDate;
use serde_json::Value;

use super::ledger_constants::*;
use super::ledger_model::{EventData, LedgerEvent, NewLedgerEvent};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdempotencyKey {
    /// Recurring deposit occurrence: one per asset and value date.
    AutoDca { asset_id: i64, value_date: NaiveDate },
    /// Loan installment: one per asset, loan and `YYYY-MM` period.
    AutoLoan {
        asset_id: i64,
        loan_id: String,
        period: String,
    },
    /// Broker-imported transaction: one per user, asset and broker identity.
    BrokerUid {
        user_id: i64,
        asset_id: i64,
        uid: String,
    },
}

impl IdempotencyKey {
    /// Derives the key from event coordinates and its data bag.
    ///
    /// Returns `None` for events that carry no idempotency contract
    /// (plain user-entered events).
    pub fn derive(
        user_id: i64,
        asset_id: i64,
        value_date: NaiveDate,
        data: &EventData,
    ) -> Option<Self> {
        let text = |key: &str| -> Option<String> {
            match data.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };

        if let Some(uid) = text(DATA_TR_UID) {
            return Some(IdempotencyKey::BrokerUid {
                user_id,
                asset_id,
                uid,
            });
        }

        match text(DATA_ORIGIN).as_deref() {
            Some(ORIGIN_AUTO_DCA) => Some(IdempotencyKey::AutoDca {
                asset_id,
                value_date,
            }),
            Some(ORIGIN_AUTO_LOAN) => Some(IdempotencyKey::AutoLoan {
                asset_id,
                loan_id: text(DATA_LOAN_ID)?,
                period: text(DATA_PERIOD)?,
            }),
            _ => None,
        }
    }

    pub fn of_new(event: &NewLedgerEvent) -> Option<Self> {
        Self::derive(event.user_id, event.asset_id, event.value_date, &event.data)
    }

    pub fn of_event(event: &LedgerEvent) -> Option<Self> {
        Self::derive(event.user_id, event.asset_id, event.value_date, &event.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> EventData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn broker_uid_wins_over_origin() {
        let d = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let key = IdempotencyKey::derive(1, 2, d, &data(json!({"tr_uid": "tr:abc", "origin": "auto_dca"})));
        assert_eq!(
            key,
            Some(IdempotencyKey::BrokerUid {
                user_id: 1,
                asset_id: 2,
                uid: "tr:abc".to_string()
            })
        );
    }

    #[test]
    fn auto_loan_accepts_numeric_loan_id() {
        let d = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let key = IdempotencyKey::derive(
            1,
            7,
            d,
            &data(json!({"origin": "auto_loan", "loan_id": 3, "period": "2024-05"})),
        );
        assert_eq!(
            key,
            Some(IdempotencyKey::AutoLoan {
                asset_id: 7,
                loan_id: "3".to_string(),
                period: "2024-05".to_string()
            })
        );
    }

    #[test]
    fn plain_events_have_no_key() {
        let d = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(IdempotencyKey::derive(1, 7, d, &EventData::new()), None);
        assert_eq!(
            IdempotencyKey::derive(1, 7, d, &data(json!({"origin": "manual"}))),
            None
        );
        // An auto_loan tag without its period is not a valid key.
        assert_eq!(
            IdempotencyKey::derive(1, 7, d, &data(json!({"origin": "auto_loan", "loan_id": "3"}))),
            None
        );
    }
}
