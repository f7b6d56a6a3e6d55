use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::IdentityVerifier;
use crate::charge::ChargeIssuer;
use crate::reconciler::DeliveryReconciler;
use crate::upsell::SecondaryChargeIssuer;
use crate::webhooks::WebhookDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub charges: ChargeIssuer,
    pub upsells: SecondaryChargeIssuer,
    pub reconciler: DeliveryReconciler,
    pub dispatcher: WebhookDispatcher,
    /// `None` rejects every authenticated route.
    pub identity: Option<Arc<dyn IdentityVerifier>>,
    /// Shared token required as `?token=` on provider callbacks, when set.
    pub pix_webhook_token: Option<String>,
}
