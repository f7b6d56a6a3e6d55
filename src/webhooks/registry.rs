use std::collections::BTreeMap;

use chrono::Utc;
use reqwest::header::{HeaderName, HeaderValue};
use sqlx::SqlitePool;
use url::Url;
use uuid::Uuid;

use super::{KNOWN_EVENTS, WebhookError};
use crate::payments::{StoreError, format_utc};
use crate::types::{CreateWebhookRequest, WebhookRegistration};

/// A stored registration, including its signing secret.
#[derive(Clone)]
pub struct Registration {
    pub id: Uuid,
    pub owner_id: String,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
    pub secret: String,
    pub headers: BTreeMap<String, String>,
    pub created_at: String,
}

impl Registration {
    pub fn to_public(&self) -> WebhookRegistration {
        WebhookRegistration {
            id: self.id,
            owner_id: self.owner_id.clone(),
            url: self.url.clone(),
            events: self.events.clone(),
            active: self.active,
            headers: self.headers.clone(),
            created_at: self.created_at.clone(),
        }
    }

    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|subscribed| subscribed == event)
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("url", &self.url)
            .field("events", &self.events)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

pub fn validate_target_url(raw: &str, allow_insecure: bool) -> Result<Url, WebhookError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| WebhookError::InvalidUrl(format!("{raw:?}: {err}")))?;

    match url.scheme() {
        "https" => {}
        "http" if allow_insecure => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(format!(
                "{raw:?}: https is required"
            )));
        }
        other => {
            return Err(WebhookError::InvalidUrl(format!(
                "{raw:?}: unsupported scheme {other}"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(WebhookError::InvalidUrl(format!("{raw:?}: missing host")));
    }

    Ok(url)
}

/// Headers the dispatcher sets itself; registrations may not override them.
pub fn is_reserved_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("x-webhook-") || name == "content-type" || name == "content-length"
}

pub fn generate_secret() -> String {
    format!(
        "whsec_{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

fn validate_events(events: &[String]) -> Result<Vec<String>, WebhookError> {
    if events.is_empty() {
        return Err(WebhookError::InvalidRegistration(
            "at least one event is required".to_string(),
        ));
    }

    let mut normalized = Vec::with_capacity(events.len());
    for event in events {
        let event = event.trim();
        if !KNOWN_EVENTS.contains(&event) {
            return Err(WebhookError::InvalidRegistration(format!(
                "unknown event: {event}"
            )));
        }
        normalized.push(event.to_string());
    }
    normalized.sort();
    normalized.dedup();

    Ok(normalized)
}

fn validate_headers(
    headers: Option<&BTreeMap<String, String>>,
) -> Result<BTreeMap<String, String>, WebhookError> {
    let Some(headers) = headers else {
        return Ok(BTreeMap::new());
    };

    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(WebhookError::InvalidRegistration(format!(
                "invalid header name: {name}"
            )));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(WebhookError::InvalidRegistration(format!(
                "invalid value for header {name}"
            )));
        }
        if is_reserved_header(name) {
            return Err(WebhookError::InvalidRegistration(format!(
                "header {name} is reserved"
            )));
        }
    }

    Ok(headers.clone())
}

/// Validates and stores a registration. The secret is generated here and
/// never changes afterwards.
pub async fn register(
    pool: &SqlitePool,
    owner_id: &str,
    req: &CreateWebhookRequest,
    allow_insecure: bool,
) -> Result<Registration, WebhookError> {
    let url = validate_target_url(&req.url, allow_insecure)?;
    let events = validate_events(&req.events)?;
    let headers = validate_headers(req.headers.as_ref())?;

    let registration = Registration {
        id: Uuid::new_v4(),
        owner_id: owner_id.to_string(),
        url: url.to_string(),
        events,
        active: true,
        secret: generate_secret(),
        headers,
        created_at: format_utc(Utc::now()),
    };

    sqlx::query(
        r#"
        INSERT INTO webhooks (id, owner_id, url, events, active, secret, headers, created_at)
        VALUES (?, ?, ?, ?, 1, ?, ?, ?)
        "#,
    )
    .bind(registration.id.to_string())
    .bind(&registration.owner_id)
    .bind(&registration.url)
    .bind(serde_json::to_string(&registration.events)?)
    .bind(&registration.secret)
    .bind(serde_json::to_string(&registration.headers)?)
    .bind(&registration.created_at)
    .execute(pool)
    .await?;

    Ok(registration)
}

pub async fn list_for_owner(
    pool: &SqlitePool,
    owner_id: &str,
) -> Result<Vec<Registration>, WebhookError> {
    let rows = sqlx::query_as::<_, RegistrationRow>(
        r#"
        SELECT id, owner_id, url, events, active, secret, headers, created_at
        FROM webhooks
        WHERE owner_id = ?
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(RegistrationRow::try_into).collect()
}

pub async fn get_for_owner(
    pool: &SqlitePool,
    owner_id: &str,
    id: Uuid,
) -> Result<Option<Registration>, WebhookError> {
    sqlx::query_as::<_, RegistrationRow>(
        r#"
        SELECT id, owner_id, url, events, active, secret, headers, created_at
        FROM webhooks
        WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(id.to_string())
    .bind(owner_id)
    .fetch_optional(pool)
    .await?
    .map(RegistrationRow::try_into)
    .transpose()
}

pub async fn deactivate(pool: &SqlitePool, owner_id: &str, id: Uuid) -> Result<bool, WebhookError> {
    let result = sqlx::query("UPDATE webhooks SET active = 0 WHERE id = ? AND owner_id = ?")
        .bind(id.to_string())
        .bind(owner_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn active_for_event(
    pool: &SqlitePool,
    owner_id: &str,
    event: &str,
) -> Result<Vec<Registration>, WebhookError> {
    let rows = sqlx::query_as::<_, RegistrationRow>(
        r#"
        SELECT id, owner_id, url, events, active, secret, headers, created_at
        FROM webhooks
        WHERE owner_id = ? AND active = 1
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let mut registrations = Vec::with_capacity(rows.len());
    for row in rows {
        let registration: Registration = row.try_into()?;
        if registration.subscribes_to(event) {
            registrations.push(registration);
        }
    }

    Ok(registrations)
}

#[derive(sqlx::FromRow)]
struct RegistrationRow {
    id: String,
    owner_id: String,
    url: String,
    events: String,
    active: bool,
    secret: String,
    headers: String,
    created_at: String,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = WebhookError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|err| StoreError::Parse(format!("invalid webhook id: {err}")))?;
        let events: Vec<String> = serde_json::from_str(&row.events)
            .map_err(|err| StoreError::Parse(format!("invalid events JSON: {err}")))?;
        let headers: BTreeMap<String, String> = serde_json::from_str(&row.headers)
            .map_err(|err| StoreError::Parse(format!("invalid headers JSON: {err}")))?;

        Ok(Registration {
            id,
            owner_id: row.owner_id,
            url: row.url,
            events,
            active: row.active,
            secret: row.secret,
            headers,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_urls() {
        assert!(validate_target_url("https://seller.example/hooks", false).is_ok());
    }

    #[test]
    fn rejects_non_http_schemes_and_garbage() {
        for raw in ["ftp://x", "not a url", "", "mailto:a@b.c", "https://"] {
            assert!(
                matches!(
                    validate_target_url(raw, true),
                    Err(WebhookError::InvalidUrl(_))
                ),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn plain_http_requires_opt_in() {
        assert!(validate_target_url("http://localhost:8080/hook", false).is_err());
        assert!(validate_target_url("http://localhost:8080/hook", true).is_ok());
    }

    #[test]
    fn events_are_checked_and_deduplicated() {
        let events = vec![
            "payment.completed".to_string(),
            "payment.created".to_string(),
            "payment.completed".to_string(),
        ];
        assert_eq!(
            validate_events(&events).expect("valid events"),
            vec!["payment.completed".to_string(), "payment.created".to_string()]
        );
        assert!(validate_events(&[]).is_err());
        assert!(validate_events(&["order.shipped".to_string()]).is_err());
    }

    #[test]
    fn reserved_headers_are_rejected() {
        let headers = BTreeMap::from([("X-Webhook-Signature".to_string(), "x".to_string())]);
        assert!(validate_headers(Some(&headers)).is_err());

        let headers = BTreeMap::from([("Authorization".to_string(), "Bearer abc".to_string())]);
        assert!(validate_headers(Some(&headers)).is_ok());
    }

    #[test]
    fn secrets_are_unique_and_prefixed() {
        let a = generate_secret();
        let b = generate_secret();
        assert!(a.starts_with("whsec_"));
        assert_eq!(a.len(), "whsec_".len() + 64);
        assert_ne!(a, b);
    }
}
