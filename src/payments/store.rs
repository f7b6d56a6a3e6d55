use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use super::{format_utc, parse_uuid};
use crate::charge::Amount;
use crate::types::{OfferKind, PaymentKind, PaymentRecord, PaymentStatus, SecondaryPaymentRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid stored data: {0}")]
    Parse(String),
}

pub(crate) fn map_insert_error(err: sqlx::Error, what: &str) -> StoreError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::Conflict(format!("{what} already exists")),
        _ => StoreError::Db(err),
    }
}

const PAYMENT_COLUMNS: &str = "id, txid, checkout_id, customer_name, customer_email, \
    customer_data, amount_cents, bump_amount_cents, total_amount_cents, status, created_at, \
    paid_at, expires_at, location_id, pix_copy_paste, pix_qr_image";

const SECONDARY_COLUMNS: &str = "id, txid, parent_payment_id, offer_id, offer_kind, \
    customer_name, customer_email, customer_data, amount_cents, bump_amount_cents, \
    total_amount_cents, status, created_at, paid_at, expires_at, location_id, pix_copy_paste, \
    pix_qr_image";

/// Whether any payment, primary or secondary, already owns `txid`.
pub async fn txid_in_use(pool: &SqlitePool, txid: &str) -> Result<bool, StoreError> {
    let taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM payment_txids WHERE txid = ?)")
            .bind(txid)
            .fetch_one(pool)
            .await?;
    Ok(taken)
}

async fn claim_txid(
    conn: &mut sqlx::SqliteConnection,
    txid: &str,
    kind: PaymentKind,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO payment_txids (txid, payment_kind, created_at) VALUES (?, ?, ?)")
        .bind(txid)
        .bind(kind.as_str())
        .bind(format_utc(Utc::now()))
        .execute(conn)
        .await
        .map_err(|err| map_insert_error(err, "payment txid"))?;
    Ok(())
}

fn table(kind: PaymentKind) -> &'static str {
    match kind {
        PaymentKind::Primary => "payments",
        PaymentKind::Secondary => "secondary_payments",
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub txid: String,
    pub checkout_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_data: Option<String>,
    pub amount: Amount,
    pub bump_amount: Amount,
    pub expires_at: DateTime<Utc>,
    pub location_id: Option<String>,
    pub pix_copy_paste: Option<String>,
    pub pix_qr_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSecondaryPayment {
    pub txid: String,
    pub parent_payment_id: Uuid,
    pub offer_id: Uuid,
    pub offer_kind: OfferKind,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_data: Option<String>,
    pub amount: Amount,
    pub expires_at: DateTime<Utc>,
    pub location_id: Option<String>,
    pub pix_copy_paste: Option<String>,
    pub pix_qr_image: Option<String>,
}

pub async fn create_payment(
    pool: &SqlitePool,
    new: &NewPayment,
) -> Result<PaymentRecord, StoreError> {
    let total = new
        .amount
        .checked_add(new.bump_amount)
        .ok_or_else(|| StoreError::Conflict("total amount overflows".to_string()))?;

    let sql = format!(
        r#"
        INSERT INTO payments (
            id, txid, checkout_id, customer_name, customer_email, customer_data,
            amount_cents, bump_amount_cents, total_amount_cents, status, created_at,
            paid_at, expires_at, location_id, pix_copy_paste, pix_qr_image
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, NULL, ?, ?, ?, ?)
        RETURNING {PAYMENT_COLUMNS}
        "#
    );

    let mut tx = pool.begin().await?;
    claim_txid(&mut *tx, &new.txid, PaymentKind::Primary).await?;

    let row = sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(Uuid::new_v4().to_string())
        .bind(&new.txid)
        .bind(new.checkout_id.to_string())
        .bind(&new.customer_name)
        .bind(&new.customer_email)
        .bind(new.customer_data.as_deref())
        .bind(new.amount.cents())
        .bind(new.bump_amount.cents())
        .bind(total.cents())
        .bind(format_utc(Utc::now()))
        .bind(format_utc(new.expires_at))
        .bind(new.location_id.as_deref())
        .bind(new.pix_copy_paste.as_deref())
        .bind(new.pix_qr_image.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| map_insert_error(err, "payment txid"))?;
    tx.commit().await?;

    row.try_into()
}

pub async fn create_secondary_payment(
    pool: &SqlitePool,
    new: &NewSecondaryPayment,
) -> Result<SecondaryPaymentRecord, StoreError> {
    let sql = format!(
        r#"
        INSERT INTO secondary_payments (
            id, txid, parent_payment_id, offer_id, offer_kind, customer_name, customer_email,
            customer_data, amount_cents, bump_amount_cents, total_amount_cents, status,
            created_at, paid_at, expires_at, location_id, pix_copy_paste, pix_qr_image
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 'pending', ?, NULL, ?, ?, ?, ?)
        RETURNING {SECONDARY_COLUMNS}
        "#
    );

    let mut tx = pool.begin().await?;
    claim_txid(&mut *tx, &new.txid, PaymentKind::Secondary).await?;

    let row = sqlx::query_as::<_, SecondaryPaymentRow>(&sql)
        .bind(Uuid::new_v4().to_string())
        .bind(&new.txid)
        .bind(new.parent_payment_id.to_string())
        .bind(new.offer_id.to_string())
        .bind(new.offer_kind.as_str())
        .bind(&new.customer_name)
        .bind(&new.customer_email)
        .bind(new.customer_data.as_deref())
        .bind(new.amount.cents())
        .bind(new.amount.cents())
        .bind(format_utc(Utc::now()))
        .bind(format_utc(new.expires_at))
        .bind(new.location_id.as_deref())
        .bind(new.pix_copy_paste.as_deref())
        .bind(new.pix_qr_image.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| map_insert_error(err, "secondary payment txid"))?;
    tx.commit().await?;

    row.try_into()
}

pub async fn find_payment_by_txid(
    pool: &SqlitePool,
    txid: &str,
) -> Result<Option<PaymentRecord>, StoreError> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE txid = ?");
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(txid)
        .fetch_optional(pool)
        .await?
        .map(PaymentRow::try_into)
        .transpose()
}

pub async fn get_payment(
    pool: &SqlitePool,
    id: Uuid,
) -> Result<Option<PaymentRecord>, StoreError> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?");
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .map(PaymentRow::try_into)
        .transpose()
}

pub async fn find_secondary_by_txid(
    pool: &SqlitePool,
    txid: &str,
) -> Result<Option<SecondaryPaymentRecord>, StoreError> {
    let sql = format!("SELECT {SECONDARY_COLUMNS} FROM secondary_payments WHERE txid = ?");
    sqlx::query_as::<_, SecondaryPaymentRow>(&sql)
        .bind(txid)
        .fetch_optional(pool)
        .await?
        .map(SecondaryPaymentRow::try_into)
        .transpose()
}

/// Conditional `pending -> paid` transition. Returns whether this call made
/// the change; duplicate or late confirmations observe `false`.
pub async fn mark_paid(
    pool: &SqlitePool,
    kind: PaymentKind,
    id: Uuid,
    paid_at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let sql = format!(
        "UPDATE {} SET status = 'paid', paid_at = ? WHERE id = ? AND status = 'pending'",
        table(kind)
    );
    let result = sqlx::query(&sql)
        .bind(format_utc(paid_at))
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Conditional `pending -> cancelled` transition.
pub async fn cancel(pool: &SqlitePool, kind: PaymentKind, id: Uuid) -> Result<bool, StoreError> {
    let sql = format!(
        "UPDATE {} SET status = 'cancelled' WHERE id = ? AND status = 'pending'",
        table(kind)
    );
    let result = sqlx::query(&sql).bind(id.to_string()).execute(pool).await?;

    Ok(result.rows_affected() == 1)
}

/// Moves every pending record whose expiry has passed to `expired`.
pub async fn expire_overdue(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let now_str = format_utc(now);
    let mut tx = pool.begin().await?;
    let mut expired = 0;

    for kind in [PaymentKind::Primary, PaymentKind::Secondary] {
        let sql = format!(
            "UPDATE {} SET status = 'expired' WHERE status = 'pending' AND expires_at <= ?",
            table(kind)
        );
        expired += sqlx::query(&sql)
            .bind(&now_str)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;
    Ok(expired)
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: String,
    txid: String,
    checkout_id: String,
    customer_name: String,
    customer_email: String,
    customer_data: Option<String>,
    amount_cents: i64,
    bump_amount_cents: i64,
    total_amount_cents: i64,
    status: String,
    created_at: String,
    paid_at: Option<String>,
    expires_at: String,
    location_id: Option<String>,
    pix_copy_paste: Option<String>,
    pix_qr_image: Option<String>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(PaymentRecord {
            id: parse_uuid("payment id", &row.id)?,
            txid: row.txid,
            checkout_id: parse_uuid("checkout id", &row.checkout_id)?,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_data: row.customer_data,
            amount_cents: row.amount_cents,
            bump_amount_cents: row.bump_amount_cents,
            total_amount_cents: row.total_amount_cents,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            paid_at: row.paid_at,
            expires_at: row.expires_at,
            location_id: row.location_id,
            pix_copy_paste: row.pix_copy_paste,
            pix_qr_image: row.pix_qr_image,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SecondaryPaymentRow {
    id: String,
    txid: String,
    parent_payment_id: String,
    offer_id: String,
    offer_kind: String,
    customer_name: String,
    customer_email: String,
    customer_data: Option<String>,
    amount_cents: i64,
    bump_amount_cents: i64,
    total_amount_cents: i64,
    status: String,
    created_at: String,
    paid_at: Option<String>,
    expires_at: String,
    location_id: Option<String>,
    pix_copy_paste: Option<String>,
    pix_qr_image: Option<String>,
}

impl TryFrom<SecondaryPaymentRow> for SecondaryPaymentRecord {
    type Error = StoreError;

    fn try_from(row: SecondaryPaymentRow) -> Result<Self, Self::Error> {
        Ok(SecondaryPaymentRecord {
            id: parse_uuid("secondary payment id", &row.id)?,
            txid: row.txid,
            parent_payment_id: parse_uuid("parent payment id", &row.parent_payment_id)?,
            offer_id: parse_uuid("offer id", &row.offer_id)?,
            offer_kind: parse_offer_kind(&row.offer_kind)?,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_data: row.customer_data,
            amount_cents: row.amount_cents,
            bump_amount_cents: row.bump_amount_cents,
            total_amount_cents: row.total_amount_cents,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            paid_at: row.paid_at,
            expires_at: row.expires_at,
            location_id: row.location_id,
            pix_copy_paste: row.pix_copy_paste,
            pix_qr_image: row.pix_qr_image,
        })
    }
}

fn parse_status(status: &str) -> Result<PaymentStatus, StoreError> {
    match status {
        "pending" => Ok(PaymentStatus::Pending),
        "paid" => Ok(PaymentStatus::Paid),
        "expired" => Ok(PaymentStatus::Expired),
        "cancelled" => Ok(PaymentStatus::Cancelled),
        other => Err(StoreError::Parse(format!("unknown payment status: {other}"))),
    }
}

pub(crate) fn parse_offer_kind(kind: &str) -> Result<OfferKind, StoreError> {
    match kind {
        "upsell" => Ok(OfferKind::Upsell),
        "downsell" => Ok(OfferKind::Downsell),
        other => Err(StoreError::Parse(format!("unknown offer kind: {other}"))),
    }
}
