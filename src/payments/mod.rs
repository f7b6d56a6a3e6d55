//! Durable payment state: primary and secondary payment records, the
//! catalog descriptors they deliver, and the append-only delivery log.

pub mod catalog;
pub mod delivery;
pub mod store;
mod sweep;

use chrono::{DateTime, SecondsFormat, Utc};

pub use catalog::{Checkout, DeliveryDescriptor, Offer, OrderBump};
pub use delivery::{insert_delivery_logs, list_delivery_logs};
pub use store::{NewPayment, NewSecondaryPayment, StoreError};
pub use sweep::spawn_expiry_sweep;

pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<uuid::Uuid, StoreError> {
    uuid::Uuid::parse_str(value)
        .map_err(|err| StoreError::Parse(format!("invalid {field}: {err}")))
}
