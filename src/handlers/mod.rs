pub mod charges;
pub mod payments;
pub mod pix;
pub mod upsells;
pub mod webhooks;

use axum::{Router, middleware, routing::{get, post}};
use tower_http::trace::TraceLayer;

use crate::{auth::require_identity, state::AppState};

pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/api/charges", post(charges::create_charge_handler))
        .route("/api/upsells/charge", post(upsells::create_upsell_charge_handler))
        .route("/api/payments/:id/cancel", post(payments::cancel_payment_handler))
        .route(
            "/api/webhooks",
            post(webhooks::create_webhook_handler).get(webhooks::list_webhooks_handler),
        )
        .route(
            "/api/webhooks/:id/deactivate",
            post(webhooks::deactivate_webhook_handler),
        )
        .route("/api/webhooks/:id/attempts", get(webhooks::list_attempts_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity));

    // The provider appends `/pix` to the registered callback URL.
    let provider = Router::new()
        .route("/api/pix/webhook", post(pix::pix_callback_handler))
        .route("/api/pix/webhook/pix", post(pix::pix_callback_handler));

    Router::new()
        .merge(authenticated)
        .merge(provider)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
