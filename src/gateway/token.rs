use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        now < self.expires_at - skew
    }
}

/// Check-then-set cache for the provider token.
///
/// Only whole `{token, expires_at}` values are ever written, so concurrent
/// refreshes can at worst fetch twice; readers never observe a torn entry.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_fresh(&self, now: DateTime<Utc>, skew: chrono::Duration) -> Option<String> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|cached| cached.is_fresh(now, skew))
            .map(|cached| cached.token.clone())
    }

    pub async fn store(&self, token: AccessToken) {
        *self.slot.write().await = Some(token);
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}
