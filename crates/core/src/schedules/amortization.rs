//! Annuity loan arithmetic.

use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

use crate::constants::CASH_DECIMAL_PRECISION;

const MONTHS_PER_YEAR: Decimal = Decimal::from_parts(12, 0, 0, false, 0);
const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// One installment of an amortization schedule. Amounts are rounded to cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmortizationRow {
    /// 1-based installment number.
    pub number: i32,
    pub payment: Decimal,
    pub interest: Decimal,
    pub principal: Decimal,
    pub remaining: Decimal,
}

fn monthly_rate(annual_rate_pct: Decimal) -> Decimal {
    annual_rate_pct / HUNDRED / MONTHS_PER_YEAR
}

/// Annuity installment `P·r / (1 - (1+r)^-n)` with `r` the monthly rate,
/// or a straight split when the rate is zero. Zero for non-positive durations.
pub fn monthly_payment(principal: Decimal, annual_rate_pct: Decimal, months: i32) -> Decimal {
    if months <= 0 {
        return Decimal::ZERO;
    }
    let n = Decimal::from(months);
    let r = monthly_rate(annual_rate_pct);
    if r.is_zero() {
        return (principal / n).round_dp(CASH_DECIMAL_PRECISION);
    }
    // (1+r)^n / ((1+r)^n - 1) is the same quotient without a negative power.
    match (Decimal::ONE + r).checked_powi(months as i64) {
        Some(growth) if growth > Decimal::ONE => {
            (principal * r * growth / (growth - Decimal::ONE)).round_dp(CASH_DECIMAL_PRECISION)
        }
        _ => (principal / n).round_dp(CASH_DECIMAL_PRECISION),
    }
}

/// Full schedule for `months` installments of `payment` (the annuity payment when `None`).
pub fn schedule(
    principal: Decimal,
    annual_rate_pct: Decimal,
    months: i32,
    payment: Option<Decimal>,
) -> Vec<AmortizationRow> {
    if months <= 0 {
        return Vec::new();
    }
    let r = monthly_rate(annual_rate_pct);
    let payment = payment.unwrap_or_else(|| monthly_payment(principal, annual_rate_pct, months));

    let mut remaining = principal;
    (1..=months)
        .map(|number| {
            let interest = remaining * r;
            let principal_paid = payment - interest;
            remaining -= principal_paid;
            AmortizationRow {
                number,
                payment: payment.round_dp(CASH_DECIMAL_PRECISION),
                interest: interest.round_dp(CASH_DECIMAL_PRECISION),
                principal: principal_paid.round_dp(CASH_DECIMAL_PRECISION),
                remaining: remaining.max(Decimal::ZERO).round_dp(CASH_DECIMAL_PRECISION),
            }
        })
        .collect()
}
