use std::path::PathBuf;
use std::time::Duration;

use super::GatewayError;

const SANDBOX_BASE_URL: &str = "https://pix-h.api.efipay.com.br";
const PRODUCTION_BASE_URL: &str = "https://pix.api.efipay.com.br";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixEnvironment {
    Sandbox,
    Production,
}

impl PixEnvironment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "homologacao" | "dev" => Some(Self::Sandbox),
            "production" | "producao" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub environment: PixEnvironment,
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub pix_key: String,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub charge_ttl_secs: i64,
    pub request_timeout: Duration,
    /// Tokens are refreshed this long before the provider says they expire.
    pub token_skew: Duration,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("charge_ttl_secs", &self.charge_ttl_secs)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl GatewayConfig {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        pix_key: impl Into<String>,
    ) -> Self {
        Self {
            environment: PixEnvironment::Sandbox,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            pix_key: pix_key.into(),
            cert_path: None,
            key_path: None,
            charge_ttl_secs: 3600,
            request_timeout: Duration::from_secs(30),
            token_skew: Duration::from_secs(10),
        }
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        let environment = match std::env::var("PIX_ENVIRONMENT") {
            Ok(value) => PixEnvironment::parse(&value).ok_or_else(|| {
                GatewayError::Config(format!("unknown PIX_ENVIRONMENT: {value}"))
            })?,
            Err(_) => PixEnvironment::Sandbox,
        };
        let base_url = std::env::var("PIX_BASE_URL")
            .unwrap_or_else(|_| environment.default_base_url().to_string());

        let mut config = Self::new(
            base_url,
            required("PIX_CLIENT_ID")?,
            required("PIX_CLIENT_SECRET")?,
            required("PIX_KEY")?,
        );
        config.environment = environment;
        config.cert_path = Some(PathBuf::from(required("PIX_CERT_PATH")?));
        config.key_path = Some(PathBuf::from(required("PIX_KEY_PATH")?));

        if let Ok(value) = std::env::var("PIX_CHARGE_TTL_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.charge_ttl_secs = parsed.max(60);
        }

        Ok(config)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn required(name: &str) -> Result<String, GatewayError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(GatewayError::Config(format!("{name} must be set"))),
    }
}
