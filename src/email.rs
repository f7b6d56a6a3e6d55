//! Deliverable email collaborator. The relay is external; this module only
//! hands it the resolved deliverables for a paid order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::types::DeliveryType;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableItem {
    pub product_name: String,
    pub delivery_type: DeliveryType,
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableEmail {
    pub to: String,
    pub customer_name: String,
    pub items: Vec<DeliverableItem>,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email relay request failed: {0}")]
    Transport(String),
    #[error("email relay returned {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait DeliverableMailer: Send + Sync {
    async fn send_deliverables(&self, email: &DeliverableEmail) -> Result<(), EmailError>;
}

/// POSTs the email as JSON to a relay service.
pub struct HttpMailer {
    http: Client,
    relay_url: String,
}

impl HttpMailer {
    pub fn new(relay_url: impl Into<String>) -> Result<Self, EmailError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| EmailError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            relay_url: relay_url.into(),
        })
    }
}

#[async_trait]
impl DeliverableMailer for HttpMailer {
    async fn send_deliverables(&self, email: &DeliverableEmail) -> Result<(), EmailError> {
        let response = self
            .http
            .post(&self.relay_url)
            .json(email)
            .send()
            .await
            .map_err(|err| EmailError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmailError::Rejected(status.as_u16()));
        }

        Ok(())
    }
}

/// Logs instead of sending. Used when no relay is configured.
pub struct LogMailer;

#[async_trait]
impl DeliverableMailer for LogMailer {
    async fn send_deliverables(&self, email: &DeliverableEmail) -> Result<(), EmailError> {
        info!(
            items = email.items.len(),
            "no email relay configured; deliverable email not sent"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmailConfig {
    pub relay_url: Option<String>,
}

impl EmailConfig {
    pub fn from_env() -> Self {
        Self {
            relay_url: std::env::var("EMAIL_RELAY_URL")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }
}

pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn DeliverableMailer>, EmailError> {
    match &config.relay_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(url.clone())?)),
        None => Ok(Arc::new(LogMailer)),
    }
}
