use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel::upsert::excluded;
use rust_decimal::Decimal;

use patrimoine_core::assets::{
    Asset, AssetRepositoryTrait, Loan, NewAsset, NewLoan, NewPortfolioLine, PortfolioLine,
    RecurringDeposit,
};
use patrimoine_core::errors::{Error, Result};

use super::model::{
    AssetDB, LoanDB, NewAssetDB, NewLoanDB, NewPortfolioLineDB, PortfolioLineDB,
    RecurringDepositDB,
};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::{assets, loans, portfolio_lines, recurring_deposits};
use crate::utils::optional_decimal_to_text;

pub struct AssetRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl AssetRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn asset_not_found(asset_id: i64) -> Error {
    Error::NotFound(format!("Asset {} not found", asset_id))
}

pub(crate) fn load_portfolio_lines(
    conn: &mut SqliteConnection,
    asset_id: i64,
) -> Result<Vec<PortfolioLine>> {
    portfolio_lines::table
        .filter(portfolio_lines::asset_id.eq(asset_id))
        .order(portfolio_lines::id.asc())
        .select(PortfolioLineDB::as_select())
        .load::<PortfolioLineDB>(conn)
        .into_core()?
        .into_iter()
        .map(PortfolioLine::try_from)
        .collect()
}

/// Upserts on `(asset_id, isin)`. Returns the number of rows written.
pub(crate) fn upsert_lines(
    conn: &mut SqliteConnection,
    lines: Vec<NewPortfolioLine>,
) -> Result<usize> {
    let mut written = 0;
    for line in lines {
        let row = NewPortfolioLineDB::from(line);
        written += diesel::insert_into(portfolio_lines::table)
            .values(&row)
            .on_conflict((portfolio_lines::asset_id, portfolio_lines::isin))
            .do_update()
            .set((
                portfolio_lines::label.eq(excluded(portfolio_lines::label)),
                portfolio_lines::units.eq(excluded(portfolio_lines::units)),
                portfolio_lines::avg_price.eq(excluded(portfolio_lines::avg_price)),
                portfolio_lines::product_type.eq(excluded(portfolio_lines::product_type)),
            ))
            .execute(conn)
            .into_core()?;
    }
    Ok(written)
}

pub(crate) fn set_current_value(
    conn: &mut SqliteConnection,
    asset_id: i64,
    value: Option<Decimal>,
) -> Result<Asset> {
    diesel::update(assets::table.find(asset_id))
        .set(assets::current_value.eq(optional_decimal_to_text(value)))
        .returning(AssetDB::as_returning())
        .get_result::<AssetDB>(conn)
        .optional()
        .into_core()?
        .ok_or_else(|| asset_not_found(asset_id))?
        .try_into()
}

#[async_trait]
impl AssetRepositoryTrait for AssetRepository {
    fn get_asset(&self, asset_id: i64) -> Result<Asset> {
        let mut conn = get_connection(&self.pool)?;

        assets::table
            .find(asset_id)
            .select(AssetDB::as_select())
            .first::<AssetDB>(&mut conn)
            .optional()
            .into_core()?
            .ok_or_else(|| asset_not_found(asset_id))?
            .try_into()
    }

    fn list_assets(&self, user_id: i64) -> Result<Vec<Asset>> {
        let mut conn = get_connection(&self.pool)?;

        assets::table
            .filter(assets::user_id.eq(user_id))
            .order(assets::id.asc())
            .select(AssetDB::as_select())
            .load::<AssetDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(Asset::try_from)
            .collect()
    }

    fn list_recurring_deposits(&self) -> Result<Vec<(Asset, RecurringDeposit)>> {
        let mut conn = get_connection(&self.pool)?;

        let rows = recurring_deposits::table
            .inner_join(assets::table)
            .order(assets::id.asc())
            .select((AssetDB::as_select(), RecurringDepositDB::as_select()))
            .load::<(AssetDB, RecurringDepositDB)>(&mut conn)
            .into_core()?;

        let mut deposits = Vec::with_capacity(rows.len());
        for (asset, deposit) in rows {
            let deposit = RecurringDeposit::try_from(deposit)?;
            if deposit.amount > Decimal::ZERO {
                deposits.push((asset.try_into()?, deposit));
            }
        }
        Ok(deposits)
    }

    fn list_loans(&self) -> Result<Vec<(Asset, Loan)>> {
        let mut conn = get_connection(&self.pool)?;

        let rows = loans::table
            .inner_join(assets::table.on(assets::id.eq(loans::asset_id)))
            .filter(loans::duration_months.gt(0))
            .order(loans::id.asc())
            .select((AssetDB::as_select(), LoanDB::as_select()))
            .load::<(AssetDB, LoanDB)>(&mut conn)
            .into_core()?;

        rows.into_iter()
            .map(|(asset, loan)| -> Result<(Asset, Loan)> {
                Ok((asset.try_into()?, loan.try_into()?))
            })
            .collect()
    }

    fn list_portfolio_lines(&self, asset_id: i64) -> Result<Vec<PortfolioLine>> {
        let mut conn = get_connection(&self.pool)?;
        load_portfolio_lines(&mut conn, asset_id)
    }

    async fn create_asset(&self, new_asset: NewAsset) -> Result<Asset> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(assets::table)
                    .values(&NewAssetDB::from_new(new_asset, Utc::now().naive_utc()))
                    .returning(AssetDB::as_returning())
                    .get_result::<AssetDB>(conn)
                    .into_core()?
                    .try_into()
            })
            .await
    }

    async fn set_recurring_deposit(&self, deposit: RecurringDeposit) -> Result<RecurringDeposit> {
        self.writer
            .exec(move |conn| {
                diesel::replace_into(recurring_deposits::table)
                    .values(&RecurringDepositDB::from(&deposit))
                    .execute(conn)
                    .into_core()?;
                Ok(deposit)
            })
            .await
    }

    async fn create_loan(&self, new_loan: NewLoan) -> Result<Loan> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(loans::table)
                    .values(&NewLoanDB::from(new_loan))
                    .returning(LoanDB::as_returning())
                    .get_result::<LoanDB>(conn)
                    .into_core()?
                    .try_into()
            })
            .await
    }

    async fn update_current_value(&self, asset_id: i64, value: Option<Decimal>) -> Result<Asset> {
        self.writer
            .exec(move |conn| set_current_value(conn, asset_id, value))
            .await
    }

    async fn upsert_portfolio_lines(&self, lines: Vec<NewPortfolioLine>) -> Result<usize> {
        self.writer.exec(move |conn| upsert_lines(conn, lines)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup;
    use chrono::NaiveDate;
    use patrimoine_core::assets::AssetKind;
    use patrimoine_core::recurrence::Frequency;
    use rust_decimal_macros::dec;

    fn new_asset(user_id: i64, kind: AssetKind, label: &str) -> NewAsset {
        NewAsset {
            user_id,
            kind,
            label: label.to_string(),
            current_value: Some(dec!(1000)),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn deposits_with_zero_amount_are_not_listed() {
        let db = setup();
        let repo = AssetRepository::new(Arc::clone(&db.pool), db.writer.clone());
        let a = repo.create_asset(new_asset(1, AssetKind::Savings, "A")).await.unwrap();
        let b = repo.create_asset(new_asset(1, AssetKind::Savings, "B")).await.unwrap();

        repo.set_recurring_deposit(RecurringDeposit {
            asset_id: a.id,
            amount: dec!(150),
            frequency: Frequency::Monthly,
            anchor_day: Some(5),
        })
        .await
        .unwrap();
        repo.set_recurring_deposit(RecurringDeposit {
            asset_id: b.id,
            amount: Decimal::ZERO,
            frequency: Frequency::Monthly,
            anchor_day: None,
        })
        .await
        .unwrap();
        // Replacing keeps one deposit per asset.
        repo.set_recurring_deposit(RecurringDeposit {
            asset_id: a.id,
            amount: dec!(200),
            frequency: Frequency::Quarterly,
            anchor_day: Some(31),
        })
        .await
        .unwrap();

        let deposits = repo.list_recurring_deposits().unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].0.label, "A");
        assert_eq!(deposits[0].1.amount, dec!(200));
        assert_eq!(deposits[0].1.frequency, Frequency::Quarterly);
    }

    #[tokio::test]
    async fn loans_round_trip_with_their_asset() {
        let db = setup();
        let repo = AssetRepository::new(Arc::clone(&db.pool), db.writer.clone());
        let flat = repo.create_asset(new_asset(1, AssetKind::RealEstate, "Flat")).await.unwrap();
        let account = repo.create_asset(new_asset(1, AssetKind::Savings, "Current")).await.unwrap();

        let loan = repo
            .create_loan(NewLoan {
                asset_id: flat.id,
                principal: dec!(200000),
                annual_rate: dec!(3.5),
                duration_months: 240,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                monthly_payment: None,
                pay_from_asset_id: Some(account.id),
            })
            .await
            .unwrap();

        let loans = repo.list_loans().unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].0.id, flat.id);
        assert_eq!(loans[0].1, loan);
        assert_eq!(loans[0].1.installment(), dec!(1159.92));
    }

    #[tokio::test]
    async fn portfolio_lines_upsert_by_isin() {
        let db = setup();
        let repo = AssetRepository::new(Arc::clone(&db.pool), db.writer.clone());
        let pea = repo.create_asset(new_asset(1, AssetKind::Portfolio, "PEA")).await.unwrap();
        let line = |units| NewPortfolioLine {
            asset_id: pea.id,
            isin: "IE00B4L5Y983".to_string(),
            label: Some("MSCI World".to_string()),
            units: Some(units),
            avg_price: Some(dec!(80.12)),
            product_type: None,
        };

        assert_eq!(repo.upsert_portfolio_lines(vec![line(dec!(3))]).await.unwrap(), 1);
        repo.upsert_portfolio_lines(vec![line(dec!(4.5))]).await.unwrap();

        let lines = repo.list_portfolio_lines(pea.id).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].units, Some(dec!(4.5)));
        assert!(lines[0].is_open());
    }

    #[tokio::test]
    async fn updating_value_of_missing_asset_is_not_found() {
        let db = setup();
        let repo = AssetRepository::new(Arc::clone(&db.pool), db.writer.clone());
        let err = repo.update_current_value(42, Some(dec!(1))).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.get_asset(42).unwrap_err().is_not_found());
    }
}
