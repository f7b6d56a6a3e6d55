use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Amount, ValidationError, normalize_amount, normalize_txid};
use crate::gateway::{ChargeRequest, CreatedCharge, GatewayError, Payer, PaymentGateway, QrCode};
use crate::payments::{Checkout, NewPayment, StoreError, catalog, store};
use crate::types::{ChargeResponse, CreateChargeRequest, PaymentRecord};
use crate::webhooks::{PAYMENT_CREATED, WebhookDispatcher};

#[derive(Debug, Error)]
pub enum ChargeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("checkout {0} not found")]
    CheckoutNotFound(Uuid),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates the provider charge and fetches its QR code.
pub async fn request_pix_charge(
    gateway: &dyn PaymentGateway,
    request: &ChargeRequest,
) -> Result<(CreatedCharge, QrCode), GatewayError> {
    let created = gateway.create_charge(request).await?;
    let qr = gateway.fetch_qr_code(&created.location_id).await?;
    Ok((created, qr))
}

/// Turns a checkout submission into a provider charge and a pending
/// payment record.
#[derive(Clone)]
pub struct ChargeIssuer {
    pool: SqlitePool,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: WebhookDispatcher,
    charge_ttl_secs: i64,
}

impl ChargeIssuer {
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

    pub async fn create(&self, request: &CreateChargeRequest) -> Result<ChargeResponse, ChargeError> {
        let customer_name = request.customer_name.trim();
        if customer_name.is_empty() {
            return Err(ValidationError::new("customerName is required").into());
        }
        let customer_email = request.customer_email.trim();
        if !looks_like_email(customer_email) {
            return Err(ValidationError::new("customerEmail is invalid").into());
        }

        let amount = normalize_amount(&request.amount)?;
        let bump_amount = match &request.bump_amount {
            Some(raw) => normalize_amount(raw)?,
            None => Amount::ZERO,
        };
        let total = amount
            .checked_add(bump_amount)
            .ok_or_else(|| ValidationError::new("total amount is too large"))?;
        if total.is_zero() {
            return Err(ValidationError::new("amount must be greater than zero").into());
        }

        let checkout = catalog::get_checkout(&self.pool, request.checkout_id)
            .await?
            .ok_or(ChargeError::CheckoutNotFound(request.checkout_id))?;
        check_prices(&self.pool, &checkout, amount, bump_amount).await?;

        let txid = normalize_txid(request.txid.as_deref());
        if store::txid_in_use(&self.pool, &txid).await? {
            return Err(StoreError::Conflict("payment txid already exists".to_string()).into());
        }
        let expires_at = Utc::now() + chrono::Duration::seconds(self.charge_ttl_secs);
        let document = request
            .customer_document
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        let charge = ChargeRequest {
            txid: txid.clone(),
            amount: total,
            expires_in_secs: self.charge_ttl_secs,
            payer: Payer {
                name: customer_name.to_string(),
                document: document.map(str::to_string),
            },
            description: Some(checkout.product.product_name.clone()),
        };

        let (created, qr) = match request_pix_charge(self.gateway.as_ref(), &charge).await {
            Ok(result) => result,
            Err(err) => {
                warn!(txid = %txid, checkout_id = %checkout.id, error = %err, "pix charge failed");
                return Err(err.into());
            }
        };

        let new = NewPayment {
            txid: txid.clone(),
            checkout_id: checkout.id,
            customer_name: customer_name.to_string(),
            customer_email: customer_email.to_string(),
            customer_data: Some(
                json!({
                    "name": customer_name,
                    "email": customer_email,
                    "document": document,
                })
                .to_string(),
            ),
            amount,
            bump_amount,
            expires_at,
            location_id: Some(created.location_id.clone()),
            pix_copy_paste: Some(qr.copy_paste.clone()),
            pix_qr_image: Some(qr.image.clone()),
        };

        let payment = match store::create_payment(&self.pool, &new).await {
            Ok(payment) => payment,
            Err(err) => {
                // The provider charge exists; without the row its confirmation
                // will arrive for an unknown txid.
                error!(txid = %txid, location_id = %created.location_id, error = %err, "failed to persist payment after charge creation");
                return Err(err.into());
            }
        };

        info!(
            payment_id = %payment.id,
            txid = %payment.txid,
            total_cents = payment.total_amount_cents,
            "payment created"
        );

        if let Err(err) = self
            .dispatcher
            .trigger(&checkout.owner_id, PAYMENT_CREATED, created_event_data(&payment))
            .await
        {
            warn!(payment_id = %payment.id, error = %err, "payment.created fan-out failed");
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

/// The paid amount decides what gets delivered, so both parts must match
/// the catalog.
async fn check_prices(
    pool: &SqlitePool,
    checkout: &Checkout,
    amount: Amount,
    bump_amount: Amount,
) -> Result<(), ChargeError> {
    if amount.cents() != checkout.product_price_cents {
        return Err(ValidationError::new("amount does not match the product price").into());
    }
    if bump_amount.is_zero() {
        return Ok(());
    }

    let bump = catalog::active_order_bump(pool, checkout.id)
        .await?
        .ok_or_else(|| ValidationError::new("checkout has no active order bump"))?;
    if bump_amount.cents() != bump.price_cents {
        return Err(ValidationError::new("bumpAmount does not match the order bump price").into());
    }
    Ok(())
}

fn created_event_data(payment: &PaymentRecord) -> serde_json::Value {
    json!({
        "paymentId": payment.id,
        "paymentKind": "primary",
        "txid": payment.txid,
        "checkoutId": payment.checkout_id,
        "amount": Amount::from_cents(payment.total_amount_cents).to_string(),
        "status": payment.status.as_str(),
        "customerEmail": payment.customer_email,
        "expiresAt": payment.expires_at,
    })
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(looks_like_email("ana@example.com"));
        assert!(!looks_like_email("ana@localhost"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("ana example@example.com"));
        assert!(!looks_like_email("ana.example.com"));
    }
}
