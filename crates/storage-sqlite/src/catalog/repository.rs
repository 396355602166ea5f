use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use patrimoine_core::catalog::{
    normalize_isin, CatalogUpsertResult, PositionSnapshot, Product, ProductCatalogTrait,
};
use patrimoine_core::errors::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::products;

#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductDB {
    pub isin: String,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<ProductDB> for Product {
    fn from(db: ProductDB) -> Self {
        Self {
            isin: db.isin,
            name: db.name,
            created_at: db.created_at,
        }
    }
}

/// Inserts unknown ISINs and counts the ones already present. Positions
/// without a usable ISIN are ignored.
pub(crate) fn upsert_products(
    conn: &mut SqliteConnection,
    positions: Vec<PositionSnapshot>,
) -> Result<CatalogUpsertResult> {
    let mut result = CatalogUpsertResult::default();
    let now = Utc::now().naive_utc();
    for position in positions {
        let Some(isin) = normalize_isin(position.isin.as_deref()) else {
            continue;
        };
        let inserted = diesel::insert_or_ignore_into(products::table)
            .values(&ProductDB {
                isin,
                name: position.name,
                created_at: now,
            })
            .execute(conn)
            .into_core()?;
        if inserted > 0 {
            result.created += 1;
        } else {
            result.existing += 1;
        }
    }
    Ok(result)
}

pub struct ProductCatalogRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl ProductCatalogRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn get_product(&self, isin: &str) -> Result<Option<Product>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(products::table
            .find(isin)
            .select(ProductDB::as_select())
            .first::<ProductDB>(&mut conn)
            .optional()
            .into_core()?
            .map(Product::from))
    }
}

#[async_trait]
impl ProductCatalogTrait for ProductCatalogRepository {
    fn is_known(&self, isin: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = products::table
            .filter(products::isin.eq(isin))
            .count()
            .get_result(&mut conn)
            .into_core()?;
        Ok(count > 0)
    }

    async fn upsert_from_positions(
        &self,
        positions: Vec<PositionSnapshot>,
    ) -> Result<CatalogUpsertResult> {
        self.writer
            .exec(move |conn| upsert_products(conn, positions))
            .await
    }
}
