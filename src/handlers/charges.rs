use axum::{Json, extract::State};

use crate::{
    error::ApiError,
    extractors::ValidJson,
    state::AppState,
    types::{ChargeResponse, CreateChargeRequest},
};

pub async fn create_charge_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateChargeRequest>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let response = state.charges.create(&req).await?;
    Ok(Json(response))
}
