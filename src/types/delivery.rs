use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

use super::PaymentKind;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DeliveryLog {
    pub id: Uuid,
    pub payment_kind: PaymentKind,
    pub payment_id: Uuid,
    /// Stable per-payment item identity, e.g. `product:<id>` or `bump:<id>`.
    pub item_key: String,
    pub customer_email: String,
    pub product_name: String,
    pub delivery_type: DeliveryType,
    pub delivery_payload: String,
    pub delivered_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Link,
    File,
    Text,
}

impl DeliveryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::File => "file",
            Self::Text => "text",
        }
    }
}
