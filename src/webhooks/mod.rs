//! Outbound notifications to seller-registered endpoints.

mod config;
mod dispatcher;
pub mod log;
pub mod registry;
pub mod signature;

use thiserror::Error;

use crate::payments::StoreError;

pub use config::WebhookConfig;
pub use dispatcher::{EventEnvelope, SendOutcome, WebhookDispatcher, backoff_delay};
pub use registry::{Registration, validate_target_url};

pub const PAYMENT_CREATED: &str = "payment.created";
pub const PAYMENT_COMPLETED: &str = "payment.completed";
pub const PAYMENT_CANCELLED: &str = "payment.cancelled";

pub const KNOWN_EVENTS: &[&str] = &[PAYMENT_CREATED, PAYMENT_COMPLETED, PAYMENT_CANCELLED];

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook url: {0}")]
    InvalidUrl(String),
    #[error("invalid webhook registration: {0}")]
    InvalidRegistration(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to serialize webhook payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to build webhook http client: {0}")]
    Client(String),
}

impl From<sqlx::Error> for WebhookError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Db(err))
    }
}
