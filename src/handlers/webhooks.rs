use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::Identity,
    error::ApiError,
    extractors::{ValidJson, ValidPath, ValidQuery},
    state::AppState,
    types::{
        CreateWebhookRequest, CreateWebhookResponse, ListAttemptsResponse, ListWebhooksResponse,
        WebhookRegistration,
    },
    webhooks::{
        log::{AttemptCursor, list_attempts},
        registry,
    },
};

#[derive(Debug, Deserialize)]
pub struct ListAttemptsQuery {
    limit: Option<i64>,
    before: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    created_at: String,
    id: String,
}

pub async fn create_webhook_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ValidJson(req): ValidJson<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<CreateWebhookResponse>), ApiError> {
    let registration = registry::register(
        &state.pool,
        &identity.owner_id,
        &req,
        state.dispatcher.config().allow_insecure,
    )
    .await?;

    info!(webhook_id = %registration.id, owner_id = %registration.owner_id, "webhook registered");

    Ok((
        StatusCode::CREATED,
        Json(CreateWebhookResponse {
            webhook: registration.to_public(),
            secret: registration.secret,
        }),
    ))
}

pub async fn list_webhooks_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ListWebhooksResponse>, ApiError> {
    let webhooks = registry::list_for_owner(&state.pool, &identity.owner_id)
        .await?
        .iter()
        .map(registry::Registration::to_public)
        .collect();

    Ok(Json(ListWebhooksResponse { webhooks }))
}

pub async fn deactivate_webhook_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<WebhookRegistration>, ApiError> {
    if !registry::deactivate(&state.pool, &identity.owner_id, id).await? {
        return Err(ApiError::not_found(format!("webhook {id} not found")));
    }

    let registration = registry::get_for_owner(&state.pool, &identity.owner_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("webhook {id} not found")))?;

    info!(webhook_id = %id, "webhook deactivated");
    Ok(Json(registration.to_public()))
}

pub async fn list_attempts_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ValidPath(id): ValidPath<Uuid>,
    ValidQuery(query): ValidQuery<ListAttemptsQuery>,
) -> Result<Json<ListAttemptsResponse>, ApiError> {
    let limit = parse_limit(query.limit)?;
    let before = match query.before {
        Some(raw) => Some(decode_cursor(&raw)?),
        None => None,
    };

    if registry::get_for_owner(&state.pool, &identity.owner_id, id)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found(format!("webhook {id} not found")));
    }

    let page = list_attempts(&state.pool, id, limit, before.as_ref()).await?;
    let next_before = match page.next_before {
        Some(cursor) => Some(encode_cursor(&cursor)?),
        None => None,
    };

    Ok(Json(ListAttemptsResponse {
        attempts: page.attempts,
        next_before,
    }))
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(ApiError::validation("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn decode_cursor(raw: &str) -> Result<AttemptCursor, ApiError> {
    let invalid = || ApiError::validation("before must be a valid cursor");

    let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid())?;
    let payload: CursorPayload = serde_json::from_slice(&decoded).map_err(|_| invalid())?;
    DateTime::parse_from_rfc3339(&payload.created_at).map_err(|_| invalid())?;
    let id = Uuid::parse_str(&payload.id).map_err(|_| invalid())?;

    Ok(AttemptCursor {
        created_at: payload.created_at,
        id,
    })
}

fn encode_cursor(cursor: &AttemptCursor) -> Result<String, ApiError> {
    let payload = CursorPayload {
        created_at: cursor.created_at.clone(),
        id: cursor.id.to_string(),
    };
    let encoded = serde_json::to_vec(&payload)
        .map_err(|_| ApiError::Internal("failed to encode cursor".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(encoded))
}
