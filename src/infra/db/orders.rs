use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    application::repos::{OrdersRepo, RepoError},
    domain::order::{Delivery, Item, Order, OrderUid, Payment},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    delivery: Json<Delivery>,
    payment: Json<Payment>,
    items: Json<Vec<Item>>,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i64,
    date_created: Option<OffsetDateTime>,
    oof_shard: String,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            uid: OrderUid::from(row.order_uid),
            track_number: row.track_number,
            entry: row.entry,
            delivery: row.delivery.0,
            payment: row.payment.0,
            items: row.items.0,
            locale: row.locale,
            internal_signature: row.internal_signature,
            customer_id: row.customer_id,
            delivery_service: row.delivery_service,
            shard_key: row.shardkey,
            sm_id: row.sm_id,
            date_created: row.date_created,
            oof_shard: row.oof_shard,
        }
    }
}

#[async_trait]
impl OrdersRepo for PostgresRepositories {
    #[instrument(skip_all, fields(order_uid = %order.uid))]
    async fn save(&self, order: &Order) -> Result<OrderUid, RepoError> {
        let uid: String = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry, delivery, payment, items, locale,
                internal_signature, customer_id, delivery_service, shardkey, sm_id,
                date_created, oof_shard
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING order_uid
            "#,
        )
        .bind(order.uid.as_str())
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(Json(&order.delivery))
        .bind(Json(&order.payment))
        .bind(Json(&order.items))
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shard_key)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(OrderUid::from(uid))
    }

    async fn list_for_warmup(&self, limit: usize) -> Result<Vec<Order>, RepoError> {
        let limit = i64::try_from(limit)
            .map_err(|_| RepoError::InvalidInput {
                message: format!("warmup limit {limit} exceeds supported range"),
            })?;

        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_uid, track_number, entry, delivery, payment, items, locale,
                   internal_signature, customer_id, delivery_service, shardkey, sm_id,
                   date_created, oof_shard
            FROM orders
            ORDER BY touched_at DESC, order_uid
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn touch(&self, uid: &OrderUid) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE orders SET touched_at = now() WHERE order_uid = $1")
            .bind(uid.as_str())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
