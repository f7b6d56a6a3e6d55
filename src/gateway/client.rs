use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{
    AccessToken, ChargeRequest, CreatedCharge, GatewayConfig, GatewayError, Payer,
    PaymentGateway, QrCode, TokenCache,
};

/// PEM-encoded client certificate and private key used for mutual TLS.
#[derive(Clone)]
pub struct ClientIdentity {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl ClientIdentity {
    pub fn from_pem(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self { cert_pem, key_pem }
    }

    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self, GatewayError> {
        let cert_pem = std::fs::read(cert_path).map_err(|err| {
            GatewayError::Certificate(format!("reading {}: {err}", cert_path.display()))
        })?;
        let key_pem = std::fs::read(key_path).map_err(|err| {
            GatewayError::Certificate(format!("reading {}: {err}", key_path.display()))
        })?;
        Ok(Self::from_pem(cert_pem, key_pem))
    }

    fn to_reqwest(&self) -> Result<reqwest::Identity, GatewayError> {
        if !looks_like_pem(&self.cert_pem) {
            return Err(GatewayError::Certificate(
                "certificate is not PEM encoded".to_string(),
            ));
        }
        if !looks_like_pem(&self.key_pem) {
            return Err(GatewayError::Certificate(
                "private key is not PEM encoded".to_string(),
            ));
        }

        let mut bundle = Vec::with_capacity(self.cert_pem.len() + self.key_pem.len() + 1);
        bundle.extend_from_slice(&self.cert_pem);
        bundle.push(b'\n');
        bundle.extend_from_slice(&self.key_pem);

        reqwest::Identity::from_pem(&bundle)
            .map_err(|err| GatewayError::Certificate(err.to_string()))
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity").finish_non_exhaustive()
    }
}

fn looks_like_pem(buf: &[u8]) -> bool {
    std::str::from_utf8(buf)
        .map(|text| text.contains("-----BEGIN ") && text.contains("-----END "))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

pub struct PixGatewayClient {
    config: GatewayConfig,
    http: Client,
    tokens: TokenCache,
}

impl PixGatewayClient {
    /// Builds the mTLS client. Malformed certificate material is an error;
    /// there is no fallback to an unauthenticated transport.
    pub fn new(config: GatewayConfig, identity: &ClientIdentity) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .use_rustls_tls()
            .identity(identity.to_reqwest()?)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| GatewayError::Certificate(err.to_string()))?;

        Ok(Self::with_http_client(config, http))
    }

    /// Uses a caller-supplied HTTP client as is.
    pub fn with_http_client(config: GatewayConfig, http: Client) -> Self {
        Self {
            config,
            http,
            tokens: TokenCache::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn access_token(&self) -> Result<String, GatewayError> {
        let now = Utc::now();
        let skew = chrono::Duration::from_std(self.config.token_skew)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));
        if let Some(token) = self.tokens.get_fresh(now, skew).await {
            return Ok(token);
        }

        let fresh = self.request_token().await?;
        let token = fresh.token.clone();
        self.tokens.store(fresh).await;
        Ok(token)
    }

    async fn request_token(&self) -> Result<AccessToken, GatewayError> {
        let response = self
            .http
            .post(self.config.url("/oauth/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .json(&json!({ "grant_type": "client_credentials" }))
            .send()
            .await
            .map_err(|err| GatewayError::Authentication(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Authentication(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Authentication(format!("invalid token response: {err}")))?;

        debug!(expires_in = body.expires_in, "obtained provider access token");

        Ok(AccessToken {
            token: body.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in.max(0)),
        })
    }

    /// Sends an authorized request; a 401 drops the cached token and the
    /// request is repeated once with a fresh one.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, GatewayError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token().await?;
        let response = build(&token)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("provider rejected access token; refreshing once");
        self.tokens.invalidate().await;
        let token = self.access_token().await?;
        build(&token)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))
    }

    fn charge_body(&self, request: &ChargeRequest) -> Value {
        let mut body = json!({
            "calendario": { "expiracao": request.expires_in_secs },
            "valor": { "original": request.amount.to_string() },
            "chave": self.config.pix_key,
        });

        if let Some(devedor) = payer_json(&request.payer) {
            body["devedor"] = devedor;
        }
        if let Some(description) = &request.description {
            body["solicitacaoPagador"] = Value::String(truncate_chars(description, 140));
        }

        body
    }
}

#[async_trait]
impl PaymentGateway for PixGatewayClient {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError> {
        let url = self.config.url(&format!("/v2/cob/{}", request.txid));
        let body = self.charge_body(request);

        let response = self
            .send_authorized(|token| self.http.put(&url).bearer_auth(token).json(&body))
            .await?;

        let status = response.status();
        let payload = read_json(response).await;
        if !status.is_success() {
            return Err(GatewayError::ChargeCreation {
                status: status.as_u16(),
                body: payload,
            });
        }

        let Some(location_id) = payload.get("loc").and_then(|loc| loc.get("id")).and_then(id_string)
        else {
            return Err(GatewayError::ChargeCreation {
                status: status.as_u16(),
                body: payload,
            });
        };

        let charge_status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);

        debug!(txid = %request.txid, location_id = %location_id, "provider charge created");

        Ok(CreatedCharge {
            location_id,
            status: charge_status,
        })
    }

    async fn fetch_qr_code(&self, location_id: &str) -> Result<QrCode, GatewayError> {
        let url = self.config.url(&format!("/v2/loc/{location_id}/qrcode"));

        let response = self
            .send_authorized(|token| self.http.get(&url).bearer_auth(token))
            .await?;

        let status = response.status();
        let payload = read_json(response).await;
        if !status.is_success() {
            return Err(GatewayError::QrCode {
                status: status.as_u16(),
                body: payload,
            });
        }

        let copy_paste = payload.get("qrcode").and_then(Value::as_str);
        let image = payload
            .get("imagemQrcode")
            .or_else(|| payload.get("linkVisualizacao"))
            .and_then(Value::as_str);

        match (copy_paste, image) {
            (Some(copy_paste), Some(image)) => Ok(QrCode {
                copy_paste: copy_paste.to_string(),
                image: image.to_string(),
            }),
            _ => Err(GatewayError::QrCode {
                status: status.as_u16(),
                body: payload,
            }),
        }
    }
}

async fn read_json(response: Response) -> Value {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

fn payer_json(payer: &Payer) -> Option<Value> {
    let digits: String = payer
        .document
        .as_deref()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let name = payer.name.trim();

    match digits.len() {
        11 => Some(json!({ "cpf": digits, "nome": name })),
        14 => Some(json!({ "cnpj": digits, "nome": name })),
        _ => None,
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
