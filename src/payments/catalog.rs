//! Read-only lookups into the seller catalog: what a checkout, order bump
//! or upsell/downsell offer delivers once paid.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::{StoreError, parse_uuid, store::parse_offer_kind};
use crate::types::{DeliveryType, OfferKind};

/// One deliverable item; `item_key` is unique within a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryDescriptor {
    pub item_key: String,
    pub product_name: String,
    pub delivery_type: DeliveryType,
    pub payload: String,
}

#[derive(Debug, Clone)]
pub struct Checkout {
    pub id: Uuid,
    pub owner_id: String,
    pub product_id: Uuid,
    pub product_price_cents: i64,
    pub product: DeliveryDescriptor,
}

#[derive(Debug, Clone)]
pub struct OrderBump {
    pub id: Uuid,
    pub price_cents: i64,
    pub descriptor: DeliveryDescriptor,
}

#[derive(Debug, Clone)]
pub struct Offer {
    pub id: Uuid,
    pub checkout_id: Uuid,
    pub kind: OfferKind,
    pub price_cents: i64,
    pub active: bool,
    pub descriptor: DeliveryDescriptor,
}

pub async fn get_checkout(pool: &SqlitePool, id: Uuid) -> Result<Option<Checkout>, StoreError> {
    let row = sqlx::query_as::<_, CheckoutRow>(
        r#"
        SELECT
            c.id,
            c.owner_id,
            p.id AS product_id,
            p.name AS product_name,
            p.price_cents AS product_price_cents,
            p.delivery_type,
            p.delivery_payload
        FROM checkouts c
        JOIN products p ON p.id = c.product_id
        WHERE c.id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let product_id = parse_uuid("product id", &row.product_id)?;
    Ok(Some(Checkout {
        id: parse_uuid("checkout id", &row.id)?,
        owner_id: row.owner_id,
        product_id,
        product_price_cents: row.product_price_cents,
        product: DeliveryDescriptor {
            item_key: format!("product:{product_id}"),
            product_name: row.product_name,
            delivery_type: parse_delivery_type(&row.delivery_type)?,
            payload: row.delivery_payload,
        },
    }))
}

/// The checkout's current order bump; the oldest active one wins when a
/// seller has left several enabled.
pub async fn active_order_bump(
    pool: &SqlitePool,
    checkout_id: Uuid,
) -> Result<Option<OrderBump>, StoreError> {
    let row = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT id, product_name, price_cents, delivery_type, delivery_payload
        FROM order_bumps
        WHERE checkout_id = ? AND active = 1
        ORDER BY created_at ASC, id ASC
        LIMIT 1
        "#,
    )
    .bind(checkout_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id = parse_uuid("order bump id", &row.id)?;
    Ok(Some(OrderBump {
        id,
        price_cents: row.price_cents,
        descriptor: DeliveryDescriptor {
            item_key: format!("bump:{id}"),
            product_name: row.product_name,
            delivery_type: parse_delivery_type(&row.delivery_type)?,
            payload: row.delivery_payload,
        },
    }))
}

pub async fn get_offer(pool: &SqlitePool, id: Uuid) -> Result<Option<Offer>, StoreError> {
    let row = sqlx::query_as::<_, OfferRow>(
        r#"
        SELECT id, checkout_id, kind, product_name, price_cents, delivery_type,
            delivery_payload, active
        FROM offers
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id = parse_uuid("offer id", &row.id)?;
    let kind = parse_offer_kind(&row.kind)?;
    Ok(Some(Offer {
        id,
        checkout_id: parse_uuid("checkout id", &row.checkout_id)?,
        kind,
        price_cents: row.price_cents,
        active: row.active,
        descriptor: DeliveryDescriptor {
            item_key: format!("{}:{id}", kind.as_str()),
            product_name: row.product_name,
            delivery_type: parse_delivery_type(&row.delivery_type)?,
            payload: row.delivery_payload,
        },
    }))
}

#[derive(sqlx::FromRow)]
struct CheckoutRow {
    id: String,
    owner_id: String,
    product_id: String,
    product_name: String,
    product_price_cents: i64,
    delivery_type: String,
    delivery_payload: String,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    product_name: String,
    price_cents: i64,
    delivery_type: String,
    delivery_payload: String,
}

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: String,
    checkout_id: String,
    kind: String,
    product_name: String,
    price_cents: i64,
    delivery_type: String,
    delivery_payload: String,
    active: bool,
}

pub(crate) fn parse_delivery_type(value: &str) -> Result<DeliveryType, StoreError> {
    match value {
        "link" => Ok(DeliveryType::Link),
        "file" => Ok(DeliveryType::File),
        "text" => Ok(DeliveryType::Text),
        other => Err(StoreError::Parse(format!("unknown delivery type: {other}"))),
    }
}
