use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use super::{DeliveryDescriptor, StoreError, catalog::parse_delivery_type, format_utc, parse_uuid};
use crate::types::{DeliveryLog, PaymentKind};

/// Inserts one delivery log per item in a single statement.
///
/// Rows that already exist for `(payment, item_key)` are skipped, so only the
/// newly written deliveries are returned.
pub async fn insert_delivery_logs(
    pool: &SqlitePool,
    kind: PaymentKind,
    payment_id: Uuid,
    customer_email: &str,
    items: &[DeliveryDescriptor],
) -> Result<Vec<DeliveryLog>, StoreError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let delivered_at = format_utc(Utc::now());
    let payment_id = payment_id.to_string();

    let mut insert = QueryBuilder::new(
        "INSERT INTO delivery_logs (id, payment_kind, payment_id, item_key, customer_email, \
            product_name, delivery_type, delivery_payload, delivered_at) ",
    );
    insert.push_values(items, |mut row, item| {
        row.push_bind(Uuid::new_v4().to_string())
            .push_bind(kind.as_str())
            .push_bind(payment_id.clone())
            .push_bind(item.item_key.clone())
            .push_bind(customer_email.to_string())
            .push_bind(item.product_name.clone())
            .push_bind(item.delivery_type.as_str())
            .push_bind(item.payload.clone())
            .push_bind(delivered_at.clone());
    });
    insert.push(
        " ON CONFLICT (payment_kind, payment_id, item_key) DO NOTHING \
        RETURNING id, payment_kind, payment_id, item_key, customer_email, product_name, \
            delivery_type, delivery_payload, delivered_at",
    );

    let rows: Vec<DeliveryRow> = insert.build_query_as().fetch_all(pool).await?;
    rows.into_iter().map(DeliveryRow::try_into).collect()
}

pub async fn list_delivery_logs(
    pool: &SqlitePool,
    kind: PaymentKind,
    payment_id: Uuid,
) -> Result<Vec<DeliveryLog>, StoreError> {
    let rows = sqlx::query_as::<_, DeliveryRow>(
        r#"
        SELECT id, payment_kind, payment_id, item_key, customer_email, product_name,
            delivery_type, delivery_payload, delivered_at
        FROM delivery_logs
        WHERE payment_kind = ? AND payment_id = ?
        ORDER BY delivered_at ASC, item_key ASC
        "#,
    )
    .bind(kind.as_str())
    .bind(payment_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DeliveryRow::try_into).collect()
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: String,
    payment_kind: String,
    payment_id: String,
    item_key: String,
    customer_email: String,
    product_name: String,
    delivery_type: String,
    delivery_payload: String,
    delivered_at: String,
}

impl TryFrom<DeliveryRow> for DeliveryLog {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let payment_kind = match row.payment_kind.as_str() {
            "primary" => PaymentKind::Primary,
            "secondary" => PaymentKind::Secondary,
            other => return Err(StoreError::Parse(format!("unknown payment kind: {other}"))),
        };

        Ok(DeliveryLog {
            id: parse_uuid("delivery id", &row.id)?,
            payment_kind,
            payment_id: parse_uuid("payment id", &row.payment_id)?,
            item_key: row.item_key,
            customer_email: row.customer_email,
            product_name: row.product_name,
            delivery_type: parse_delivery_type(&row.delivery_type)?,
            delivery_payload: row.delivery_payload,
            delivered_at: row.delivered_at,
        })
    }
}
