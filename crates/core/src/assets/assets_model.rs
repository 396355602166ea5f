use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::recurrence::Frequency;
use crate::schedules::amortization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Savings,
    RealEstate,
    Portfolio,
    Other,
}

impl AssetKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            AssetKind::Savings => "savings",
            AssetKind::RealEstate => "real_estate",
            AssetKind::Portfolio => "portfolio",
            AssetKind::Other => "other",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "savings" | "livret" => Ok(AssetKind::Savings),
            "real_estate" | "immo" => Ok(AssetKind::RealEstate),
            "portfolio" => Ok(AssetKind::Portfolio),
            "other" | "autre" => Ok(AssetKind::Other),
            other => Err(Error::invalid(format!("Unknown asset kind '{}'", other))),
        }
    }
}

/// A holding owned by one user. `current_value` is the stored baseline that
/// balance projection starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub user_id: i64,
    pub kind: AssetKind,
    pub label: String,
    pub current_value: Option<Decimal>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAsset {
    pub user_id: i64,
    pub kind: AssetKind,
    pub label: String,
    pub current_value: Option<Decimal>,
    /// Defaults to now when absent.
    pub created_at: Option<NaiveDateTime>,
}

/// Automatic deposit configured on a savings asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringDeposit {
    pub asset_id: i64,
    pub amount: Decimal,
    pub frequency: Frequency,
    /// Wanted day of month; missing means the 1st.
    pub anchor_day: Option<i32>,
}

/// Amortizing loan attached to an asset (usually real estate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: i64,
    pub asset_id: i64,
    pub principal: Decimal,
    /// Nominal yearly rate in percent (3.5 means 3.5%).
    pub annual_rate: Decimal,
    pub duration_months: i32,
    pub start_date: NaiveDate,
    /// Explicit installment; computed from the annuity formula when absent.
    pub monthly_payment: Option<Decimal>,
    /// Cash asset debited by each installment.
    pub pay_from_asset_id: Option<i64>,
}

impl Loan {
    /// The installment paid each month.
    pub fn installment(&self) -> Decimal {
        match self.monthly_payment {
            Some(p) if p > Decimal::ZERO => p,
            _ => amortization::monthly_payment(
                self.principal,
                self.annual_rate,
                self.duration_months,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoan {
    pub asset_id: i64,
    pub principal: Decimal,
    pub annual_rate: Decimal,
    pub duration_months: i32,
    pub start_date: NaiveDate,
    pub monthly_payment: Option<Decimal>,
    pub pay_from_asset_id: Option<i64>,
}

/// One security held in a portfolio asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioLine {
    pub id: i64,
    pub asset_id: i64,
    pub isin: String,
    pub label: Option<String>,
    pub units: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    /// Wrapper the line is held in: `PEA`, `PER`, `AV` or `CTO`.
    pub product_type: Option<String>,
}

impl PortfolioLine {
    pub fn is_open(&self) -> bool {
        self.units.is_some_and(|u| u > Decimal::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPortfolioLine {
    pub asset_id: i64,
    pub isin: String,
    pub label: Option<String>,
    pub units: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub product_type: Option<String>,
}
