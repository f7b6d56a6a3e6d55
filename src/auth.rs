use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use reqwest::Client;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::{error::ApiError, state::AppState};

/// The authenticated seller behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub owner_id: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid token")]
    InvalidToken,
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// Single shared token mapped to a fixed owner. Local and dev deployments.
pub struct StaticTokenVerifier {
    token: String,
    owner_id: String,
}

impl StaticTokenVerifier {
    pub fn new(token: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            owner_id: owner_id.into(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        if !constant_time_eq(self.token.as_bytes(), token.as_bytes()) {
            return Err(IdentityError::InvalidToken);
        }
        Ok(Identity {
            owner_id: self.owner_id.clone(),
        })
    }
}

#[derive(Deserialize)]
struct IdentityResponse {
    id: Option<String>,
    sub: Option<String>,
}

/// Resolves bearer tokens against an external identity service, which
/// answers `GET <url>` with the caller's `id` (or `sub`).
pub struct RemoteIdentityVerifier {
    http: Client,
    url: String,
}

impl RemoteIdentityVerifier {
    pub fn new(url: impl Into<String>) -> Result<Self, IdentityError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for RemoteIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let response = self
            .http
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(IdentityError::InvalidToken);
            }
            status => {
                return Err(IdentityError::Unavailable(format!(
                    "identity service returned {status}"
                )));
            }
        }

        let body: IdentityResponse = response
            .json()
            .await
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?;

        body.id
            .or(body.sub)
            .filter(|id| !id.is_empty())
            .map(|owner_id| Identity { owner_id })
            .ok_or(IdentityError::InvalidToken)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub url: Option<String>,
    pub static_token: Option<String>,
    pub static_owner: Option<String>,
}

impl IdentityConfig {
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            url: var("IDENTITY_URL"),
            static_token: var("IDENTITY_STATIC_TOKEN"),
            static_owner: var("IDENTITY_STATIC_OWNER"),
        }
    }

    /// The remote service wins when both are configured. `None` means every
    /// authenticated route answers 401.
    pub fn verifier(&self) -> Result<Option<Arc<dyn IdentityVerifier>>, IdentityError> {
        if let Some(url) = &self.url {
            return Ok(Some(Arc::new(RemoteIdentityVerifier::new(url.clone())?)));
        }
        match (&self.static_token, &self.static_owner) {
            (Some(token), Some(owner)) => Ok(Some(Arc::new(StaticTokenVerifier::new(
                token.clone(),
                owner.clone(),
            )))),
            _ => Ok(None),
        }
    }
}

pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(verifier) = &state.identity else {
        return Err(ApiError::unauthorized("authentication is not configured"));
    };

    let Some(token) = bearer_token(&req) else {
        return Err(ApiError::unauthorized(
            "missing or invalid Authorization header",
        ));
    };

    let identity = match verifier.verify(token).await {
        Ok(identity) => identity,
        Err(IdentityError::InvalidToken) => return Err(ApiError::unauthorized("invalid token")),
        Err(err) => {
            warn!(error = %err, "identity verification failed");
            return Err(ApiError::unauthorized("could not verify token"));
        }
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim_start();
    let (scheme, rest) = (trimmed.get(..7)?, trimmed.get(7..)?);
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
