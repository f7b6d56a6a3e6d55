use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub max_attempts: u32,
    pub timeout: Duration,
    /// Delay before the first retry; later retries double it.
    pub backoff_base: Duration,
    /// Permits plain `http://` targets. Local and dev deployments only.
    pub allow_insecure: bool,
    pub response_body_limit: usize,
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("WEBHOOK_MAX_ATTEMPTS")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.max_attempts = parsed.max(1);
        }
        if let Ok(value) = std::env::var("WEBHOOK_TIMEOUT_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.timeout = Duration::from_secs(parsed.max(1));
        }
        if let Ok(value) = std::env::var("WEBHOOK_BACKOFF_BASE_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.backoff_base = Duration::from_millis(parsed);
        }
        if let Ok(value) = std::env::var("WEBHOOK_ALLOW_INSECURE") {
            config.allow_insecure = matches!(value.trim(), "1" | "true" | "yes");
        }

        config
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            allow_insecure: false,
            response_body_limit: 1000,
        }
    }
}
