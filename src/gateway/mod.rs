//! Client side of the PIX provider API: OAuth token, charge creation and
//! QR code retrieval over mutual TLS.

mod client;
mod config;
mod token;

use async_trait::async_trait;
use thiserror::Error;

use crate::charge::Amount;

pub use client::{ClientIdentity, PixGatewayClient};
pub use config::{GatewayConfig, PixEnvironment};
pub use token::{AccessToken, TokenCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payer {
    pub name: String,
    /// CPF (11 digits) or CNPJ (14 digits); anything else is not sent.
    pub document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub txid: String,
    pub amount: Amount,
    pub expires_in_secs: i64,
    pub payer: Payer,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCharge {
    pub location_id: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCode {
    pub copy_paste: String,
    /// Embedded `data:` image or a URL, whichever the provider returned.
    pub image: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider authentication failed: {0}")]
    Authentication(String),
    #[error("invalid client certificate: {0}")]
    Certificate(String),
    #[error("provider rejected charge creation with status {status}")]
    ChargeCreation {
        status: u16,
        body: serde_json::Value,
    },
    #[error("provider rejected qr code request with status {status}")]
    QrCode {
        status: u16,
        body: serde_json::Value,
    },
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Status code reported by the provider, when it answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::ChargeCreation { status, .. } | Self::QrCode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw provider payload attached to a rejection.
    pub fn provider_body(&self) -> Option<&serde_json::Value> {
        match self {
            Self::ChargeCreation { body, .. } | Self::QrCode { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates (or re-affirms) the charge keyed by `request.txid`. Repeating
    /// the call with the same txid never creates a second charge.
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError>;

    async fn fetch_qr_code(&self, location_id: &str) -> Result<QrCode, GatewayError>;
}
