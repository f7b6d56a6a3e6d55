use serde::{Deserialize, Serialize};
use specta::Type;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Public view of a webhook registration. The signing secret is only ever
/// returned once, in [`CreateWebhookResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct WebhookRegistration {
    pub id: Uuid,
    pub owner_id: String,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
    pub headers: BTreeMap<String, String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct WebhookAttemptLog {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_name: String,
    pub attempt: i64,
    pub outcome: WebhookAttemptOutcome,

    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,

    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAttemptOutcome {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CreateWebhookRequest {
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CreateWebhookResponse {
    pub webhook: WebhookRegistration,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListWebhooksResponse {
    pub webhooks: Vec<WebhookRegistration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListAttemptsResponse {
    pub attempts: Vec<WebhookAttemptLog>,
    pub next_before: Option<String>,
}
