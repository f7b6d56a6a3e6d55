use axum::{Extension, Json, extract::State};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::Identity,
    charge::Amount,
    error::ApiError,
    extractors::ValidPath,
    payments::catalog,
    payments::store,
    state::AppState,
    types::{CancelPaymentResponse, PaymentKind},
    webhooks::PAYMENT_CANCELLED,
};

pub async fn cancel_payment_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<CancelPaymentResponse>, ApiError> {
    let not_found = || ApiError::not_found(format!("payment {id} not found"));

    let payment = store::get_payment(&state.pool, id).await?.ok_or_else(not_found)?;
    let checkout = catalog::get_checkout(&state.pool, payment.checkout_id)
        .await?
        .filter(|checkout| checkout.owner_id == identity.owner_id)
        .ok_or_else(not_found)?;

    if !store::cancel(&state.pool, PaymentKind::Primary, id).await? {
        return Err(ApiError::conflict(format!(
            "payment is {} and can no longer be cancelled",
            payment.status.as_str()
        )));
    }

    let payment = store::get_payment(&state.pool, id).await?.ok_or_else(not_found)?;
    info!(payment_id = %payment.id, txid = %payment.txid, "payment cancelled");

    let data = json!({
        "paymentId": payment.id,
        "paymentKind": "primary",
        "txid": payment.txid,
        "checkoutId": payment.checkout_id,
        "totalAmount": Amount::from_cents(payment.total_amount_cents).to_string(),
        "status": payment.status.as_str(),
        "customerEmail": payment.customer_email,
    });
    if let Err(err) = state
        .dispatcher
        .trigger(&checkout.owner_id, PAYMENT_CANCELLED, data)
        .await
    {
        warn!(payment_id = %payment.id, error = %err, "payment.cancelled fan-out failed");
    }

    Ok(Json(CancelPaymentResponse { payment }))
}
