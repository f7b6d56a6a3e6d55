use std::time::Duration;

use thiserror::Error;

use crate::auth::IdentityConfig;
use crate::email::EmailConfig;
use crate::gateway::{GatewayConfig, GatewayError};
use crate::webhooks::WebhookConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Everything the service reads from the environment at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub gateway: GatewayConfig,
    pub webhooks: WebhookConfig,
    pub email: EmailConfig,
    pub identity: IdentityConfig,
    pub pix_webhook_token: Option<String>,
    /// `None` disables the expiry sweep.
    pub expiry_sweep: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:checkout.db".to_string());
        let bind_addr = std::env::var("CHECKOUT_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string());

        let pix_webhook_token = std::env::var("PIX_WEBHOOK_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let mut expiry_sweep = Some(Duration::from_secs(60));
        if let Ok(value) = std::env::var("PAYMENT_EXPIRY_SWEEP_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            expiry_sweep = (parsed > 0).then(|| Duration::from_secs(parsed));
        }

        Ok(Self {
            database_url,
            bind_addr,
            gateway: GatewayConfig::from_env()?,
            webhooks: WebhookConfig::from_env(),
            email: EmailConfig::from_env(),
            identity: IdentityConfig::from_env(),
            pix_webhook_token,
            expiry_sweep,
        })
    }
}
