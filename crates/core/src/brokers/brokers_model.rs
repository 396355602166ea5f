use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Saved login of a user at one broker. The PIN is only ever held encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerLink {
    pub id: i64,
    pub user_id: i64,
    pub broker: String,
    pub phone: String,
    pub pin_enc: Option<String>,
    pub remember_pin: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBrokerLink {
    pub user_id: i64,
    pub broker: String,
    pub phone: String,
    pub pin_enc: Option<String>,
    pub remember_pin: bool,
}

/// What clients get to see of a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerLinkView {
    pub broker: String,
    pub phone_masked: String,
    pub remember_pin: bool,
    pub has_pin: bool,
    pub updated_at: NaiveDateTime,
}

impl From<&BrokerLink> for BrokerLinkView {
    fn from(link: &BrokerLink) -> Self {
        Self {
            broker: link.broker.clone(),
            phone_masked: mask_phone(&link.phone),
            remember_pin: link.remember_pin,
            has_pin: link.pin_enc.is_some(),
            updated_at: link.updated_at,
        }
    }
}

/// Keeps the first four and last two characters, e.g. `+336******78`.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 6), tail)
}
