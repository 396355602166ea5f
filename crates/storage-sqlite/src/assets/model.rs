//! Database models for assets and their schedules.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

use patrimoine_core::assets::{
    Asset, Loan, NewAsset, NewLoan, NewPortfolioLine, PortfolioLine, RecurringDeposit,
};
use patrimoine_core::errors::{Error, Result};

use crate::utils::{decimal_to_text, optional_decimal_to_text, parse_decimal, parse_optional_decimal};

#[derive(Queryable, Identifiable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::assets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AssetDB {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub label: String,
    pub current_value: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::assets)]
pub struct NewAssetDB {
    pub user_id: i64,
    pub kind: String,
    pub label: String,
    pub current_value: Option<String>,
    pub created_at: NaiveDateTime,
}

impl NewAssetDB {
    pub fn from_new(asset: NewAsset, now: NaiveDateTime) -> Self {
        Self {
            user_id: asset.user_id,
            kind: asset.kind.as_str().to_string(),
            label: asset.label,
            current_value: optional_decimal_to_text(asset.current_value),
            created_at: asset.created_at.unwrap_or(now),
        }
    }
}

impl TryFrom<AssetDB> for Asset {
    type Error = Error;

    fn try_from(db: AssetDB) -> Result<Self> {
        Ok(Self {
            id: db.id,
            user_id: db.user_id,
            kind: db.kind.parse()?,
            label: db.label,
            current_value: parse_optional_decimal(db.current_value.as_deref(), "current_value")?,
            created_at: db.created_at,
        })
    }
}

#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::recurring_deposits)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecurringDepositDB {
    pub asset_id: i64,
    pub amount: String,
    pub frequency: String,
    pub anchor_day: Option<i32>,
}

impl From<&RecurringDeposit> for RecurringDepositDB {
    fn from(deposit: &RecurringDeposit) -> Self {
        Self {
            asset_id: deposit.asset_id,
            amount: decimal_to_text(deposit.amount),
            frequency: deposit.frequency.as_str().to_string(),
            anchor_day: deposit.anchor_day,
        }
    }
}

impl TryFrom<RecurringDepositDB> for RecurringDeposit {
    type Error = Error;

    fn try_from(db: RecurringDepositDB) -> Result<Self> {
        Ok(Self {
            asset_id: db.asset_id,
            amount: parse_decimal(&db.amount, "amount")?,
            frequency: db.frequency.parse()?,
            anchor_day: db.anchor_day,
        })
    }
}

#[derive(Queryable, Identifiable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::loans)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LoanDB {
    pub id: i64,
    pub asset_id: i64,
    pub principal: String,
    pub annual_rate: String,
    pub duration_months: i32,
    pub start_date: NaiveDate,
    pub monthly_payment: Option<String>,
    pub pay_from_asset_id: Option<i64>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::loans)]
pub struct NewLoanDB {
    pub asset_id: i64,
    pub principal: String,
    pub annual_rate: String,
    pub duration_months: i32,
    pub start_date: NaiveDate,
    pub monthly_payment: Option<String>,
    pub pay_from_asset_id: Option<i64>,
}

impl From<NewLoan> for NewLoanDB {
    fn from(loan: NewLoan) -> Self {
        Self {
            asset_id: loan.asset_id,
            principal: decimal_to_text(loan.principal),
            annual_rate: decimal_to_text(loan.annual_rate),
            duration_months: loan.duration_months,
            start_date: loan.start_date,
            monthly_payment: optional_decimal_to_text(loan.monthly_payment),
            pay_from_asset_id: loan.pay_from_asset_id,
        }
    }
}

impl TryFrom<LoanDB> for Loan {
    type Error = Error;

    fn try_from(db: LoanDB) -> Result<Self> {
        Ok(Self {
            id: db.id,
            asset_id: db.asset_id,
            principal: parse_decimal(&db.principal, "principal")?,
            annual_rate: parse_decimal(&db.annual_rate, "annual_rate")?,
            duration_months: db.duration_months,
            start_date: db.start_date,
            monthly_payment: parse_optional_decimal(db.monthly_payment.as_deref(), "monthly_payment")?,
            pay_from_asset_id: db.pay_from_asset_id,
        })
    }
}

#[derive(Queryable, Identifiable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::portfolio_lines)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PortfolioLineDB {
    pub id: i64,
    pub asset_id: i64,
    pub isin: String,
    pub label: Option<String>,
    pub units: Option<String>,
    pub avg_price: Option<String>,
    pub product_type: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::portfolio_lines)]
pub struct NewPortfolioLineDB {
    pub asset_id: i64,
    pub isin: String,
    pub label: Option<String>,
    pub units: Option<String>,
    pub avg_price: Option<String>,
    pub product_type: Option<String>,
}

impl From<NewPortfolioLine> for NewPortfolioLineDB {
    fn from(line: NewPortfolioLine) -> Self {
        Self {
            asset_id: line.asset_id,
            isin: line.isin,
            label: line.label,
            units: optional_decimal_to_text(line.units),
            avg_price: optional_decimal_to_text(line.avg_price),
            product_type: line.product_type,
        }
    }
}

impl TryFrom<PortfolioLineDB> for PortfolioLine {
    type Error = Error;

    fn try_from(db: PortfolioLineDB) -> Result<Self> {
        Ok(Self {
            id: db.id,
            asset_id: db.asset_id,
            isin: db.isin,
            label: db.label,
            units: parse_optional_decimal(db.units.as_deref(), "units")?,
            avg_price: parse_optional_decimal(db.avg_price.as_deref(), "avg_price")?,
            product_type: db.product_type,
        })
    }
}
