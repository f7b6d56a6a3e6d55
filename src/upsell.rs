//! Follow-on charges for accepted upsell and downsell offers.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::charge::{Amount, normalize_txid, request_pix_charge};
use crate::gateway::{ChargeRequest, GatewayError, Payer, PaymentGateway};
use crate::payments::{NewSecondaryPayment, StoreError, catalog, store};
use crate::types::{ChargeResponse, PaymentStatus, SecondaryPaymentRecord, UpsellChargeRequest};
use crate::webhooks::{PAYMENT_CREATED, WebhookDispatcher};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("payment {0} not found")]
    PaymentNotFound(Uuid),
    #[error("offer {0} not found")]
    OfferNotFound(Uuid),
    #[error("payment is {}; offers require a paid purchase", .0.as_str())]
    ParentNotPaid(PaymentStatus),
    #[error("offer is not available for this purchase: {0}")]
    OfferUnavailable(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct SecondaryChargeIssuer {
    pool: SqlitePool,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: WebhookDispatcher,
    charge_ttl_secs: i64,
}

impl SecondaryChargeIssuer {
    pub fn new(
        pool: SqlitePool,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: WebhookDispatcher,
        charge_ttl_secs: i64,
    ) -> Self {
        Self {
            pool,
            gateway,
            dispatcher,
            charge_ttl_secs,
        }
    }

    /// Charges the offer to the customer of an already paid purchase. The new
    /// record has its own txid and expiry and delivers only the offer.
    pub async fn issue(&self, request: &UpsellChargeRequest) -> Result<ChargeResponse, IssueError> {
        let parent = store::get_payment(&self.pool, request.payment_id)
            .await?
            .ok_or(IssueError::PaymentNotFound(request.payment_id))?;
        if parent.status != PaymentStatus::Paid {
            return Err(IssueError::ParentNotPaid(parent.status));
        }

        let offer = catalog::get_offer(&self.pool, request.offer_id)
            .await?
            .ok_or(IssueError::OfferNotFound(request.offer_id))?;
        if !offer.active {
            return Err(IssueError::OfferUnavailable("offer is inactive".to_string()));
        }
        if offer.checkout_id != parent.checkout_id {
            return Err(IssueError::OfferUnavailable(
                "offer belongs to a different checkout".to_string(),
            ));
        }

        let amount = Amount::from_cents(offer.price_cents);
        let txid = normalize_txid(request.txid.as_deref());
        if store::txid_in_use(&self.pool, &txid).await? {
            return Err(StoreError::Conflict("payment txid already exists".to_string()).into());
        }
        let expires_at = Utc::now() + chrono::Duration::seconds(self.charge_ttl_secs);
        let document = parent
            .customer_data
            .as_deref()
            .and_then(|data| serde_json::from_str::<serde_json::Value>(data).ok())
            .and_then(|data| data.get("document")?.as_str().map(str::to_string));

        let charge = ChargeRequest {
            txid: txid.clone(),
            amount,
            expires_in_secs: self.charge_ttl_secs,
            payer: Payer {
                name: parent.customer_name.clone(),
                document,
            },
            description: Some(offer.descriptor.product_name.clone()),
        };

        let (created, qr) = match request_pix_charge(self.gateway.as_ref(), &charge).await {
            Ok(result) => result,
            Err(err) => {
                warn!(txid = %txid, offer_id = %offer.id, error = %err, "offer charge failed");
                return Err(err.into());
            }
        };

        let new = NewSecondaryPayment {
            txid: txid.clone(),
            parent_payment_id: parent.id,
            offer_id: offer.id,
            offer_kind: offer.kind,
            customer_name: parent.customer_name.clone(),
            customer_email: parent.customer_email.clone(),
            customer_data: parent.customer_data.clone(),
            amount,
            expires_at,
            location_id: Some(created.location_id.clone()),
            pix_copy_paste: Some(qr.copy_paste.clone()),
            pix_qr_image: Some(qr.image.clone()),
        };

        let payment = match store::create_secondary_payment(&self.pool, &new).await {
            Ok(payment) => payment,
            Err(err) => {
                error!(txid = %txid, location_id = %created.location_id, error = %err, "failed to persist offer payment after charge creation");
                return Err(err.into());
            }
        };

        info!(
            payment_id = %payment.id,
            parent_payment_id = %parent.id,
            offer_kind = payment.offer_kind.as_str(),
            txid = %payment.txid,
            "offer payment created"
        );

        match catalog::get_checkout(&self.pool, parent.checkout_id).await {
            Ok(Some(checkout)) => {
                if let Err(err) = self
                    .dispatcher
                    .trigger(&checkout.owner_id, PAYMENT_CREATED, created_event_data(&payment))
                    .await
                {
                    warn!(payment_id = %payment.id, error = %err, "payment.created fan-out failed");
                }
            }
            Ok(None) => warn!(checkout_id = %parent.checkout_id, "checkout missing for offer payment"),
            Err(err) => warn!(payment_id = %payment.id, error = %err, "payment.created fan-out failed"),
        }

        Ok(ChargeResponse {
            success: true,
            txid: payment.txid,
            copia_e_cola: qr.copy_paste,
            imagem_qrcode_base64: qr.image,
            loc: created.location_id,
            expires_at: payment.expires_at,
        })
    }
}

fn created_event_data(payment: &SecondaryPaymentRecord) -> serde_json::Value {
    json!({
        "paymentId": payment.id,
        "paymentKind": "secondary",
        "parentPaymentId": payment.parent_payment_id,
        "offerId": payment.offer_id,
        "offerKind": payment.offer_kind.as_str(),
        "txid": payment.txid,
        "amount": Amount::from_cents(payment.total_amount_cents).to_string(),
        "status": payment.status.as_str(),
        "customerEmail": payment.customer_email,
        "expiresAt": payment.expires_at,
    })
}
