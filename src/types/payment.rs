use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub txid: String,
    pub checkout_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    /// Opaque customer identifier blob (JSON text) as captured at checkout.
    pub customer_data: Option<String>,

    pub amount_cents: i64,
    pub bump_amount_cents: i64,
    pub total_amount_cents: i64,

    pub status: PaymentStatus,
    pub created_at: String,
    pub paid_at: Option<String>,
    pub expires_at: String,

    pub location_id: Option<String>,
    pub pix_copy_paste: Option<String>,
    pub pix_qr_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct SecondaryPaymentRecord {
    pub id: Uuid,
    pub txid: String,
    pub parent_payment_id: Uuid,
    pub offer_id: Uuid,
    pub offer_kind: OfferKind,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_data: Option<String>,

    pub amount_cents: i64,
    pub bump_amount_cents: i64,
    pub total_amount_cents: i64,

    pub status: PaymentStatus,
    pub created_at: String,
    pub paid_at: Option<String>,
    pub expires_at: String,

    pub location_id: Option<String>,
    pub pix_copy_paste: Option<String>,
    pub pix_qr_image: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Which payment table a delivery or notification refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Primary,
    Secondary,
}

impl PaymentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    Upsell,
    Downsell,
}

impl OfferKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upsell => "upsell",
            Self::Downsell => "downsell",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CancelPaymentResponse {
    pub payment: PaymentRecord,
}
