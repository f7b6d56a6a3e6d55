use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    auth::constant_time_eq,
    error::ApiError,
    extractors::{LenientJson, ValidQuery},
    reconciler::ReconcileOutcome,
    state::AppState,
    types::PixCallbackBody,
};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    token: Option<String>,
}

/// Provider payment confirmations. Every event in the batch is processed;
/// any failure answers 500 so the provider redelivers the batch, which is
/// safe because confirmation is idempotent.
pub async fn pix_callback_handler(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<CallbackQuery>,
    LenientJson(body): LenientJson<PixCallbackBody>,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.pix_webhook_token {
        let provided = query.token.as_deref().unwrap_or_default();
        if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
            warn!("provider callback rejected: bad token");
            return Err(ApiError::unauthorized("invalid callback token"));
        }
    }

    let mut failures = 0usize;
    for event in &body.pix {
        let Some(txid) = event.txid.as_deref() else {
            warn!(end_to_end_id = ?event.end_to_end_id, "callback event without txid skipped");
            continue;
        };

        match state.reconciler.confirm(txid).await {
            Ok(ReconcileOutcome::Delivered { deliveries, .. }) => {
                info!(txid, delivered = deliveries.len(), "payment confirmed");
            }
            Ok(_) => {}
            Err(err) => {
                error!(txid, error = %err, "payment confirmation failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{failures} confirmation(s) failed") })),
        )
            .into_response());
    }

    Ok(Json(json!({ "success": true })).into_response())
}
