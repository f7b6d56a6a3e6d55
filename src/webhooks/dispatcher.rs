use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::log::{NewAttempt, record_attempt};
use super::registry::{self, Registration, validate_target_url};
use super::signature::{self, headers};
use super::{WebhookConfig, WebhookError};
use crate::payments::format_utc;
use crate::types::WebhookAttemptOutcome;

/// Body posted to registered endpoints. The signature covers the exact
/// serialized bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub event: String,
    pub timestamp: String,
    pub data: Value,
}

impl EventEnvelope {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: event.to_string(),
            timestamp: format_utc(Utc::now()),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    RetryScheduled { next_attempt: u32, delay: Duration },
    Failed,
}

/// Delay before retrying after `attempt` failed: `base * 2^(attempt-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

enum AttemptResult {
    Success { status: u16, body: String },
    Retryable { status: Option<u16>, body: Option<String>, error: String },
    Terminal { status: Option<u16>, body: Option<String>, error: String },
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    pool: SqlitePool,
    http: Client,
    config: Arc<WebhookConfig>,
}

impl WebhookDispatcher {
    pub fn new(pool: SqlitePool, config: WebhookConfig) -> Result<Self, WebhookError> {
        // A redirect would carry the signed body to an unvalidated target.
        let http = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| WebhookError::Client(err.to_string()))?;

        Ok(Self {
            pool,
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Fans `event` out to every active registration of `owner_id` that
    /// subscribes to it. Sends run in background tasks; the return value is
    /// the number of registrations notified.
    pub async fn trigger(
        &self,
        owner_id: &str,
        event: &str,
        data: Value,
    ) -> Result<usize, WebhookError> {
        let registrations = registry::active_for_event(&self.pool, owner_id, event).await?;
        if registrations.is_empty() {
            debug!(owner_id, event, "no webhook registrations subscribed");
            return Ok(0);
        }

        let envelope = EventEnvelope::new(event, data);
        let count = registrations.len();

        for registration in registrations {
            let dispatcher = self.clone();
            let envelope = envelope.clone();
            tokio::spawn(async move {
                if let Err(err) = dispatcher.send(&registration, &envelope, 1).await {
                    warn!(
                        webhook_id = %registration.id,
                        event_id = %envelope.id,
                        error = %err,
                        "webhook send rejected"
                    );
                }
            });
        }

        info!(owner_id, event, event_id = %envelope.id, registrations = count, "webhook event triggered");
        Ok(count)
    }

    /// Performs one delivery attempt and records it. Retryable failures
    /// schedule the next attempt in the background and return immediately.
    pub async fn send(
        &self,
        registration: &Registration,
        envelope: &EventEnvelope,
        attempt: u32,
    ) -> Result<SendOutcome, WebhookError> {
        let url = validate_target_url(&registration.url, self.config.allow_insecure)?;
        let body = serde_json::to_vec(envelope)?;
        let signature = signature::sign(&registration.secret, &body);

        let mut request_headers = HeaderMap::new();
        for (name, value) in &registration.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    request_headers.insert(name, value);
                }
                _ => warn!(webhook_id = %registration.id, header = %name, "skipping invalid custom header"),
            }
        }

        let request = self
            .http
            .post(url)
            .timeout(self.config.timeout)
            .headers(request_headers)
            .header(CONTENT_TYPE, "application/json")
            .header(headers::SIGNATURE, signature)
            .header(headers::WEBHOOK_ID, envelope.id.to_string())
            .header(headers::EVENT, envelope.event.as_str())
            .header(headers::TIMESTAMP, envelope.timestamp.as_str())
            .body(body);

        let result = match request.send().await {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let body = truncate_chars(&text, self.config.response_body_limit);
                if status.is_success() {
                    AttemptResult::Success {
                        status: status.as_u16(),
                        body,
                    }
                } else if status.is_server_error() {
                    AttemptResult::Retryable {
                        status: Some(status.as_u16()),
                        body: Some(body),
                        error: format!("target returned {status}"),
                    }
                } else {
                    AttemptResult::Terminal {
                        status: Some(status.as_u16()),
                        body: Some(body),
                        error: format!("target returned {status}"),
                    }
                }
            }
            Err(err) if err.is_builder() => AttemptResult::Terminal {
                status: None,
                body: None,
                error: err.to_string(),
            },
            Err(err) => AttemptResult::Retryable {
                status: None,
                body: None,
                error: if err.is_timeout() {
                    format!("timed out after {:?}", self.config.timeout)
                } else {
                    err.to_string()
                },
            },
        };

        let (outcome, status, response_body, error_message, retryable) = match &result {
            AttemptResult::Success { status, body } => (
                WebhookAttemptOutcome::Success,
                Some(*status),
                Some(body.as_str()),
                None,
                false,
            ),
            AttemptResult::Retryable {
                status,
                body,
                error,
            } => (
                WebhookAttemptOutcome::Failed,
                *status,
                body.as_deref(),
                Some(error.as_str()),
                true,
            ),
            AttemptResult::Terminal {
                status,
                body,
                error,
            } => (
                WebhookAttemptOutcome::Failed,
                *status,
                body.as_deref(),
                Some(error.as_str()),
                false,
            ),
        };

        let logged = record_attempt(
            &self.pool,
            &NewAttempt {
                webhook_id: registration.id,
                event_id: envelope.id,
                event_name: &envelope.event,
                attempt,
                outcome,
                response_status: status,
                response_body,
                error_message,
            },
        )
        .await;
        if let Err(err) = logged {
            error!(
                webhook_id = %registration.id,
                event_id = %envelope.id,
                attempt,
                error = %err,
                "failed to record webhook attempt"
            );
        }

        if outcome == WebhookAttemptOutcome::Success {
            info!(webhook_id = %registration.id, event_id = %envelope.id, attempt, "webhook delivered");
            return Ok(SendOutcome::Delivered);
        }

        if retryable && attempt < self.config.max_attempts {
            let delay = backoff_delay(self.config.backoff_base, attempt);
            warn!(
                webhook_id = %registration.id,
                event_id = %envelope.id,
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = error_message.unwrap_or_default(),
                "webhook attempt failed; retry scheduled"
            );
            self.schedule_retry(registration.clone(), envelope.clone(), attempt + 1, delay);
            return Ok(SendOutcome::RetryScheduled {
                next_attempt: attempt + 1,
                delay,
            });
        }

        if retryable {
            error!(
                webhook_id = %registration.id,
                event_id = %envelope.id,
                attempt,
                "webhook retries exhausted"
            );
        } else {
            warn!(
                webhook_id = %registration.id,
                event_id = %envelope.id,
                attempt,
                error = error_message.unwrap_or_default(),
                "webhook attempt failed permanently"
            );
        }

        Ok(SendOutcome::Failed)
    }

    // Retries live in this process only; a restart drops pending timers.
    fn schedule_retry(
        &self,
        registration: Registration,
        envelope: EventEnvelope,
        attempt: u32,
        delay: Duration,
    ) {
        let dispatcher = self.clone();
        let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = dispatcher.send(&registration, &envelope, attempt).await {
                warn!(
                    webhook_id = %registration.id,
                    event_id = %envelope.id,
                    attempt,
                    error = %err,
                    "webhook retry rejected"
                );
            }
        });
        tokio::spawn(task);
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
