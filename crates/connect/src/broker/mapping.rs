//! Broker taxonomy mapping.
//!
//! This module handles:
//! - Mapping broker event types onto ledger kinds and categories
//! - Deriving trade direction and unit price
//! - Recovering an ISIN from the instrument icon path
//! - Classifying sub-accounts into tax wrappers (PEA, PER, AV, CTO)

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use patrimoine_core::constants::PRICE_DECIMAL_PRECISION;
use patrimoine_core::ledger::{
    EventKind, CATEGORY_BUY, CATEGORY_DEPOSIT, CATEGORY_DIVIDEND, CATEGORY_FEE,
    CATEGORY_INTEREST, CATEGORY_PAY_IN, CATEGORY_SELL,
};

use super::models::{BrokerAccountSnapshot, BrokerTransaction};

/// Order and savings-plan executions.
pub const EXECUTION_TYPES: &[&str] = &[
    "order_executed",
    "trade_invoice",
    "trading_trade_executed",
    "savings_plan_executed",
    "savings_plan_invoice_created",
    "trading_savingsplan_executed",
    "benefits_saveback_execution",
    "benefits_spare_change_execution",
];

pub const DIVIDEND_TYPES: &[&str] = &[
    "credit",
    "dividend",
    "payout",
    "ssp_corporate_action_invoice_cash",
];

pub const INTEREST_TYPES: &[&str] = &["interest_payout", "interest_payout_created"];

pub const FEE_TYPES: &[&str] = &["fee", "order_fee", "card_order_billed"];

pub const DEPOSIT_TYPES: &[&str] = &[
    "deposit",
    "incoming_transfer",
    "incoming_transfer_delegation",
    "payment_inbound",
    "payment_inbound_sepa_direct_debit",
];

pub const PAY_IN_TYPES: &[&str] = &[
    "pay_in",
    "payment_inbound_credit_card",
    "payment_inbound_apple_pay",
    "payment_inbound_google_pay",
];

/// Ledger fields derived from one broker transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedEvent {
    pub kind: EventKind,
    pub category: Option<String>,
    pub value_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub isin: Option<String>,
    pub note: Option<String>,
}

impl MappedEvent {
    /// Records without a date or an amount cannot become events.
    pub fn is_complete(&self) -> bool {
        self.value_date.is_some() && self.amount.is_some()
    }
}

/// Classifies a lowercased broker event type.
pub fn map_event_type(event_type: &str) -> (EventKind, Option<&'static str>) {
    let t = event_type.trim();
    if EXECUTION_TYPES.contains(&t) {
        (EventKind::PortfolioTrade, None)
    } else if DIVIDEND_TYPES.contains(&t) {
        (EventKind::Dividend, Some(CATEGORY_DIVIDEND))
    } else if INTEREST_TYPES.contains(&t) {
        (EventKind::PortfolioTrade, Some(CATEGORY_INTEREST))
    } else if FEE_TYPES.contains(&t) {
        (EventKind::PortfolioTrade, Some(CATEGORY_FEE))
    } else if DEPOSIT_TYPES.contains(&t) {
        (EventKind::PortfolioTrade, Some(CATEGORY_DEPOSIT))
    } else if PAY_IN_TYPES.contains(&t) {
        (EventKind::PortfolioTrade, Some(CATEGORY_PAY_IN))
    } else {
        (EventKind::Other, None)
    }
}

pub fn map_transaction(tx: &BrokerTransaction) -> MappedEvent {
    let (kind, category) = map_event_type(tx.event_type.as_deref().unwrap_or_default());
    let is_execution = kind == EventKind::PortfolioTrade && category.is_none();

    let category = if is_execution {
        // Cash leaves the account on a buy.
        tx.amount.map(|amount| {
            if amount < Decimal::ZERO {
                CATEGORY_BUY
            } else {
                CATEGORY_SELL
            }
        })
    } else {
        category
    };

    let unit_price = if is_execution {
        unit_price(tx.amount, tx.quantity)
    } else {
        None
    };

    MappedEvent {
        kind,
        category: category.map(str::to_string),
        value_date: tx.value_date,
        amount: tx.amount,
        quantity: tx.quantity,
        unit_price,
        isin: tx
            .isin
            .clone()
            .or_else(|| tx.icon.as_deref().and_then(extract_isin_from_icon)),
        note: tx.title.clone().or_else(|| tx.subtitle.clone()),
    }
}

/// `|amount| / quantity`, when both are present and the quantity is not zero.
pub fn unit_price(amount: Option<Decimal>, quantity: Option<Decimal>) -> Option<Decimal> {
    let amount = amount?;
    let quantity = quantity.filter(|q| !q.is_zero())?;
    Some((amount.abs() / quantity.abs()).round_dp(PRICE_DECIMAL_PRECISION))
}

fn isin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b([A-Z]{2}[A-Z0-9]{9}[0-9])\b").expect("isin regex"))
}

/// Finds an ISIN inside an icon path such as `logos/IE00B4L5Y983/v2`.
pub fn extract_isin_from_icon(icon: &str) -> Option<String> {
    isin_pattern()
        .captures(icon)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Tax wrapper a securities account is held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    Pea,
    Per,
    Av,
    Cto,
}

impl ProductType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProductType::Pea => "PEA",
            ProductType::Per => "PER",
            ProductType::Av => "AV",
            ProductType::Cto => "CTO",
        }
    }
}

/// Labels the broker uses when it does not say which wrapper an account is.
const GENERIC_PRODUCT_TYPES: &[&str] = &["", "default", "securities", "cash", "tax_wrapper"];

/// Lowercased words of `text`, split on punctuation and camelCase humps.
fn words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Maps a reported product type. Generic labels give `None`.
pub fn map_product_type(raw: &str) -> Option<ProductType> {
    let s = raw.trim().to_lowercase();
    if GENERIC_PRODUCT_TYPES.contains(&s.as_str()) {
        return None;
    }
    let words = words(raw);
    let has = |w: &str| words.iter().any(|word| word == w);
    if has("pea") {
        Some(ProductType::Pea)
    } else if has("per") {
        Some(ProductType::Per)
    } else if has("life") || has("assurance") {
        Some(ProductType::Av)
    } else if has("cto") {
        Some(ProductType::Cto)
    } else {
        None
    }
}

fn history_hint(history: &[BrokerTransaction]) -> Option<ProductType> {
    let words = history
        .iter()
        .flat_map(|tx| [&tx.title, &tx.subtitle, &tx.event_type])
        .flatten()
        .flat_map(|text| words(text))
        .collect::<Vec<_>>();

    let has = |w: &str| words.iter().any(|word| word == w);
    if has("pea") {
        Some(ProductType::Pea)
    } else if has("per") || has("retraite") || has("pension") {
        Some(ProductType::Per)
    } else if has("assurance") || (has("life") && has("insurance")) {
        Some(ProductType::Av)
    } else {
        None
    }
}

/// Wrapper of an account: the reported type when it is specific, else a hint
/// from the account's own history, else `CTO`.
pub fn infer_product_type(reported: Option<&str>, history: &[BrokerTransaction]) -> ProductType {
    reported
        .and_then(map_product_type)
        .or_else(|| history_hint(history))
        .unwrap_or(ProductType::Cto)
}

/// Wrapper of every account of a snapshot, in order.
///
/// Broker transactions carry no account reference, so the history only
/// speaks for an account when it is the single one reporting a generic type,
/// and never for a wrapper another account already reports. Other generic
/// accounts fall back to `CTO`.
pub fn infer_account_product_types(
    accounts: &[BrokerAccountSnapshot],
    history: &[BrokerTransaction],
) -> Vec<ProductType> {
    let reported: Vec<Option<ProductType>> = accounts
        .iter()
        .map(|a| a.product_type.as_deref().and_then(map_product_type))
        .collect();
    let unresolved = reported.iter().filter(|r| r.is_none()).count();
    let attributable = unresolved == 1
        && history_hint(history).is_some_and(|hint| !reported.contains(&Some(hint)));
    let history = if attributable { history } else { &[] };

    accounts
        .iter()
        .map(|a| infer_product_type(a.product_type.as_deref(), history))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::Value;

    fn tx(event_type: &str, amount: Option<Decimal>) -> BrokerTransaction {
        BrokerTransaction {
            id: Some("id".to_string()),
            event_type: Some(event_type.to_string()),
            timestamp: None,
            value_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            title: Some("Core MSCI World".to_string()),
            subtitle: None,
            amount,
            quantity: None,
            isin: None,
            icon: None,
            raw: Value::Null,
        }
    }

    #[test]
    fn execution_direction_follows_amount_sign() {
        let mut buy = tx("order_executed", Some(dec!(-250)));
        buy.quantity = Some(dec!(3));
        let mapped = map_transaction(&buy);
        assert_eq!(mapped.kind, EventKind::PortfolioTrade);
        assert_eq!(mapped.category.as_deref(), Some("buy"));
        assert_eq!(mapped.unit_price, Some(dec!(83.3333)));

        let sell = map_transaction(&tx("savings_plan_executed", Some(dec!(100))));
        assert_eq!(sell.category.as_deref(), Some("sell"));
        assert_eq!(sell.unit_price, None);
    }

    #[test]
    fn cash_operations_are_trades_told_apart_by_category() {
        for (event_type, category) in [
            ("interest_payout", "interest"),
            ("order_fee", "fee"),
            ("incoming_transfer", "deposit"),
            ("payment_inbound_credit_card", "pay_in"),
        ] {
            let mapped = map_transaction(&tx(event_type, Some(dec!(5))));
            assert_eq!(mapped.kind, EventKind::PortfolioTrade, "{}", event_type);
            assert_eq!(mapped.category.as_deref(), Some(category));
        }
        assert_eq!(map_transaction(&tx("credit", Some(dec!(1)))).kind, EventKind::Dividend);
        assert_eq!(map_transaction(&tx("card_successful_transaction", None)).kind, EventKind::Other);
    }

    #[test]
    fn isin_falls_back_to_icon_path() {
        let mut record = tx("credit", Some(dec!(4.2)));
        record.icon = Some("logos/FR0000131104/v2".to_string());
        assert_eq!(map_transaction(&record).isin.as_deref(), Some("FR0000131104"));

        assert_eq!(extract_isin_from_icon("logos/bank_icon/v2"), None);
        assert_eq!(extract_isin_from_icon("merchant-logos/12345"), None);
    }

    #[test]
    fn product_type_prefers_specific_report_then_history() {
        assert_eq!(infer_product_type(Some("PEA"), &[]), ProductType::Pea);
        assert_eq!(infer_product_type(Some("lifeInsurance"), &[]), ProductType::Av);

        let mut hinted = tx("order_executed", None);
        hinted.subtitle = Some("Versement PEA".to_string());
        assert_eq!(infer_product_type(Some("securities"), &[hinted]), ProductType::Pea);

        // "performance" must not read as PER.
        let mut noise = tx("order_executed", None);
        noise.title = Some("Performance fund".to_string());
        assert_eq!(infer_product_type(Some("default"), &[noise]), ProductType::Cto);
        assert_eq!(infer_product_type(None, &[]), ProductType::Cto);
    }

    #[test]
    fn reported_type_matches_whole_words_only() {
        assert_eq!(map_product_type("PEA_PME"), Some(ProductType::Pea));
        assert_eq!(map_product_type("per-individuel"), Some(ProductType::Per));
        assert_eq!(map_product_type("Assurance-vie"), Some(ProductType::Av));
        assert_eq!(map_product_type("lifeInsurance"), Some(ProductType::Av));
        assert_eq!(map_product_type("cto"), Some(ProductType::Cto));

        assert_eq!(map_product_type("superannuation"), None);
        assert_eq!(map_product_type("operations"), None);
        assert_eq!(map_product_type("peanut_fund"), None);
        assert_eq!(map_product_type("lifecycle"), None);
        assert_eq!(map_product_type("Securities"), None);
    }

    fn account(product_type: Option<&str>) -> BrokerAccountSnapshot {
        BrokerAccountSnapshot {
            product_type: product_type.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn history_speaks_only_for_a_single_generic_account() {
        let mut hinted = tx("order_executed", None);
        hinted.subtitle = Some("Versement PEA".to_string());
        let history = [hinted];

        let single = infer_account_product_types(&[account(Some("securities"))], &history);
        assert_eq!(single, vec![ProductType::Pea]);

        let with_specific = infer_account_product_types(
            &[account(Some("perIndividuel")), account(None)],
            &history,
        );
        assert_eq!(with_specific, vec![ProductType::Per, ProductType::Pea]);

        // Two generic accounts: the history cannot be attributed.
        let ambiguous =
            infer_account_product_types(&[account(None), account(Some("default"))], &history);
        assert_eq!(ambiguous, vec![ProductType::Cto, ProductType::Cto]);

        // The hinted wrapper is already reported by the other account.
        let claimed =
            infer_account_product_types(&[account(Some("PEA")), account(None)], &history);
        assert_eq!(claimed, vec![ProductType::Pea, ProductType::Cto]);
    }
}
