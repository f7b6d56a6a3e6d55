use axum::{Json, extract::State};

use crate::{
    error::ApiError,
    extractors::ValidJson,
    state::AppState,
    types::{ChargeResponse, UpsellChargeRequest},
};

pub async fn create_upsell_charge_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<UpsellChargeRequest>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let response = state.upsells.issue(&req).await?;
    Ok(Json(response))
}
