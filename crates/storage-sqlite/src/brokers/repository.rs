use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;

use patrimoine_core::brokers::{BrokerLink, BrokerLinkRepositoryTrait, NewBrokerLink};
use patrimoine_core::errors::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::broker_links;

#[derive(Queryable, Identifiable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::broker_links)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BrokerLinkDB {
    pub id: i64,
    pub user_id: i64,
    pub broker: String,
    pub phone: String,
    pub pin_enc: Option<String>,
    pub remember_pin: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::broker_links)]
struct NewBrokerLinkDB {
    user_id: i64,
    broker: String,
    phone: String,
    pin_enc: Option<String>,
    remember_pin: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl From<BrokerLinkDB> for BrokerLink {
    fn from(db: BrokerLinkDB) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            broker: db.broker,
            phone: db.phone,
            pin_enc: db.pin_enc,
            remember_pin: db.remember_pin,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

pub struct BrokerLinkRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl BrokerLinkRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl BrokerLinkRepositoryTrait for BrokerLinkRepository {
    fn get_link(&self, user_id: i64, broker: &str) -> Result<Option<BrokerLink>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(broker_links::table
            .filter(broker_links::user_id.eq(user_id))
            .filter(broker_links::broker.eq(broker))
            .select(BrokerLinkDB::as_select())
            .first::<BrokerLinkDB>(&mut conn)
            .optional()
            .into_core()?
            .map(BrokerLink::from))
    }

    async fn upsert_link(&self, link: NewBrokerLink) -> Result<BrokerLink> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().naive_utc();
                let row = NewBrokerLinkDB {
                    user_id: link.user_id,
                    broker: link.broker,
                    phone: link.phone,
                    pin_enc: link.pin_enc,
                    remember_pin: link.remember_pin,
                    created_at: now,
                    updated_at: now,
                };
                let stored = diesel::insert_into(broker_links::table)
                    .values(&row)
                    .on_conflict((broker_links::user_id, broker_links::broker))
                    .do_update()
                    .set((
                        broker_links::phone.eq(excluded(broker_links::phone)),
                        broker_links::pin_enc.eq(excluded(broker_links::pin_enc)),
                        broker_links::remember_pin.eq(excluded(broker_links::remember_pin)),
                        broker_links::updated_at.eq(excluded(broker_links::updated_at)),
                    ))
                    .returning(BrokerLinkDB::as_returning())
                    .get_result::<BrokerLinkDB>(conn)
                    .into_core()?;
                Ok(stored.into())
            })
            .await
    }

    async fn delete_link(&self, user_id: i64, broker: &str) -> Result<bool> {
        let broker = broker.to_string();
        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(
                    broker_links::table
                        .filter(broker_links::user_id.eq(user_id))
                        .filter(broker_links::broker.eq(broker)),
                )
                .execute(conn)
                .into_core()?;
                Ok(deleted > 0)
            })
            .await
    }
}
