//! Provider confirmations drive payments from `pending` to `paid` and write
//! the delivery log for what was bought.
//!
//! The conditional status update is the only serialization point: of any
//! number of concurrent or repeated confirmations for a txid, exactly one
//! observes the transition and performs delivery. A confirmation that finds
//! the payment already paid re-runs the idempotent delivery insert, so logs
//! lost to a failure after the transition are filled in on redelivery.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::charge::Amount;
use crate::email::{DeliverableEmail, DeliverableItem, DeliverableMailer};
use crate::payments::{
    DeliveryDescriptor, StoreError, catalog, format_utc, insert_delivery_logs, store,
};
use crate::types::{DeliveryLog, PaymentKind, PaymentRecord, PaymentStatus, SecondaryPaymentRecord};
use crate::webhooks::{PAYMENT_COMPLETED, WebhookDispatcher};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("paid {kind} payment {payment_id} has no deliverable: {reason}", kind = .payment_kind.as_str())]
    MissingDeliverable {
        payment_kind: PaymentKind,
        payment_id: Uuid,
        reason: String,
    },
    #[error("failed to record deliveries for paid {kind} payment {payment_id}: {source}", kind = .payment_kind.as_str())]
    DeliveryLog {
        payment_kind: PaymentKind,
        payment_id: Uuid,
        source: StoreError,
    },
}

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// No payment carries the txid; the event is dropped.
    UnknownTxid,
    /// The payment was no longer pending. `recovered` counts delivery logs
    /// that an earlier confirmation failed to write and this one added.
    AlreadySettled {
        payment_kind: PaymentKind,
        payment_id: Uuid,
        recovered: usize,
    },
    Delivered {
        payment_kind: PaymentKind,
        payment_id: Uuid,
        deliveries: Vec<DeliveryLog>,
    },
}

#[derive(Clone)]
pub struct DeliveryReconciler {
    pool: SqlitePool,
    dispatcher: WebhookDispatcher,
    mailer: Arc<dyn DeliverableMailer>,
}

impl DeliveryReconciler {
    pub fn new(
        pool: SqlitePool,
        dispatcher: WebhookDispatcher,
        mailer: Arc<dyn DeliverableMailer>,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            mailer,
        }
    }

    pub async fn confirm(&self, txid: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let txid = txid.trim();
        if txid.is_empty() {
            warn!("confirmation without txid dropped");
            return Ok(ReconcileOutcome::UnknownTxid);
        }

        if let Some(payment) = store::find_payment_by_txid(&self.pool, txid).await? {
            return self.confirm_primary(payment).await;
        }
        if let Some(payment) = store::find_secondary_by_txid(&self.pool, txid).await? {
            return self.confirm_secondary(payment).await;
        }

        warn!(txid, "confirmation for unknown txid dropped");
        Ok(ReconcileOutcome::UnknownTxid)
    }

    async fn confirm_primary(
        &self,
        payment: PaymentRecord,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let kind = PaymentKind::Primary;
        let now = Utc::now();
        let transitioned = store::mark_paid(&self.pool, kind, payment.id, now).await?;
        let payment = if transitioned {
            info!(payment_id = %payment.id, txid = %payment.txid, "payment marked paid");
            payment
        } else {
            match store::get_payment(&self.pool, payment.id).await? {
                Some(current) if current.status == PaymentStatus::Paid => current,
                current => {
                    let status = current.map_or(payment.status, |current| current.status);
                    info!(payment_id = %payment.id, txid = %payment.txid, status = status.as_str(), "payment already settled");
                    return Ok(ReconcileOutcome::AlreadySettled {
                        payment_kind: kind,
                        payment_id: payment.id,
                        recovered: 0,
                    });
                }
            }
        };

        let checkout = match catalog::get_checkout(&self.pool, payment.checkout_id).await {
            Ok(Some(checkout)) => checkout,
            Ok(None) => {
                return Err(self.missing(kind, payment.id, "checkout not found".to_string()));
            }
            Err(err) => return Err(self.missing(kind, payment.id, err.to_string())),
        };

        let mut items = vec![checkout.product.clone()];
        if payment.bump_amount_cents > 0 {
            match catalog::active_order_bump(&self.pool, checkout.id).await {
                Ok(Some(bump)) => items.push(bump.descriptor),
                Ok(None) => error!(
                    payment_id = %payment.id,
                    checkout_id = %checkout.id,
                    "order bump was charged but the checkout has no active bump; delivering product only"
                ),
                Err(err) => error!(
                    payment_id = %payment.id,
                    error = %err,
                    "order bump lookup failed; delivering product only"
                ),
            }
        }

        let deliveries = self
            .record_deliveries(kind, payment.id, &payment.customer_email, &items)
            .await?;

        if !deliveries.is_empty() {
            let data = json!({
                "paymentId": payment.id,
                "paymentKind": kind.as_str(),
                "txid": payment.txid,
                "checkoutId": payment.checkout_id,
                "amount": Amount::from_cents(payment.amount_cents).to_string(),
                "bumpAmount": Amount::from_cents(payment.bump_amount_cents).to_string(),
                "totalAmount": Amount::from_cents(payment.total_amount_cents).to_string(),
                "status": "paid",
                "paidAt": payment.paid_at.clone().unwrap_or_else(|| format_utc(now)),
                "customerName": payment.customer_name,
                "customerEmail": payment.customer_email,
                "items": delivered_items_json(&deliveries),
            });
            self.notify(
                Some(checkout.owner_id),
                data,
                email_for(&payment.customer_name, &payment.customer_email, &deliveries),
            );
        }

        Ok(outcome(transitioned, kind, payment.id, deliveries))
    }

    async fn confirm_secondary(
        &self,
        payment: SecondaryPaymentRecord,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let kind = PaymentKind::Secondary;
        let now = Utc::now();
        let transitioned = store::mark_paid(&self.pool, kind, payment.id, now).await?;
        let payment = if transitioned {
            info!(payment_id = %payment.id, txid = %payment.txid, "offer payment marked paid");
            payment
        } else {
            match store::find_secondary_by_txid(&self.pool, &payment.txid).await? {
                Some(current) if current.status == PaymentStatus::Paid => current,
                current => {
                    let status = current.map_or(payment.status, |current| current.status);
                    info!(payment_id = %payment.id, txid = %payment.txid, status = status.as_str(), "offer payment already settled");
                    return Ok(ReconcileOutcome::AlreadySettled {
                        payment_kind: kind,
                        payment_id: payment.id,
                        recovered: 0,
                    });
                }
            }
        };

        let offer = match catalog::get_offer(&self.pool, payment.offer_id).await {
            Ok(Some(offer)) => offer,
            Ok(None) => {
                return Err(self.missing(kind, payment.id, "offer not found".to_string()));
            }
            Err(err) => return Err(self.missing(kind, payment.id, err.to_string())),
        };

        let deliveries = self
            .record_deliveries(
                kind,
                payment.id,
                &payment.customer_email,
                std::slice::from_ref(&offer.descriptor),
            )
            .await?;

        if !deliveries.is_empty() {
            let owner_id = match self.owner_of_parent(payment.parent_payment_id).await {
                Ok(owner_id) => owner_id,
                Err(err) => {
                    warn!(payment_id = %payment.id, error = %err, "cannot resolve seller for offer payment; skipping webhooks");
                    None
                }
            };

            let data = json!({
                "paymentId": payment.id,
                "paymentKind": kind.as_str(),
                "parentPaymentId": payment.parent_payment_id,
                "offerId": payment.offer_id,
                "offerKind": payment.offer_kind.as_str(),
                "txid": payment.txid,
                "totalAmount": Amount::from_cents(payment.total_amount_cents).to_string(),
                "status": "paid",
                "paidAt": payment.paid_at.clone().unwrap_or_else(|| format_utc(now)),
                "customerName": payment.customer_name,
                "customerEmail": payment.customer_email,
                "items": delivered_items_json(&deliveries),
            });
            self.notify(
                owner_id,
                data,
                email_for(&payment.customer_name, &payment.customer_email, &deliveries),
            );
        }

        Ok(outcome(transitioned, kind, payment.id, deliveries))
    }

    async fn record_deliveries(
        &self,
        kind: PaymentKind,
        payment_id: Uuid,
        customer_email: &str,
        items: &[DeliveryDescriptor],
    ) -> Result<Vec<DeliveryLog>, ReconcileError> {
        match insert_delivery_logs(&self.pool, kind, payment_id, customer_email, items).await {
            Ok(deliveries) => {
                info!(payment_id = %payment_id, delivered = deliveries.len(), "deliveries recorded");
                Ok(deliveries)
            }
            Err(err) => {
                error!(
                    payment_kind = kind.as_str(),
                    payment_id = %payment_id,
                    error = %err,
                    "CRITICAL: payment is paid but deliveries were not recorded"
                );
                Err(ReconcileError::DeliveryLog {
                    payment_kind: kind,
                    payment_id,
                    source: err,
                })
            }
        }
    }

    async fn owner_of_parent(&self, parent_id: Uuid) -> Result<Option<String>, StoreError> {
        let Some(parent) = store::get_payment(&self.pool, parent_id).await? else {
            return Ok(None);
        };
        Ok(catalog::get_checkout(&self.pool, parent.checkout_id)
            .await?
            .map(|checkout| checkout.owner_id))
    }

    fn missing(&self, payment_kind: PaymentKind, payment_id: Uuid, reason: String) -> ReconcileError {
        error!(
            payment_kind = payment_kind.as_str(),
            payment_id = %payment_id,
            reason = %reason,
            "CRITICAL: payment is paid but its deliverable could not be resolved"
        );
        ReconcileError::MissingDeliverable {
            payment_kind,
            payment_id,
            reason,
        }
    }

    /// Webhook fan-out and the deliverable email run independently in the
    /// background. Their failures are logged and never touch the payment.
    fn notify(&self, owner_id: Option<String>, data: serde_json::Value, email: Option<DeliverableEmail>) {
        if let Some(owner_id) = owner_id {
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                if let Err(err) = dispatcher.trigger(&owner_id, PAYMENT_COMPLETED, data).await {
                    warn!(owner_id = %owner_id, error = %err, "payment.completed fan-out failed");
                }
            });
        }

        if let Some(email) = email {
            let mailer = Arc::clone(&self.mailer);
            tokio::spawn(async move {
                if let Err(err) = mailer.send_deliverables(&email).await {
                    error!(error = %err, items = email.items.len(), "deliverable email failed; manual resend required");
                }
            });
        }
    }
}

/// Only the confirmation that made the transition reports `Delivered`. Any
/// other one that still wrote logs is reporting a repair.
fn outcome(
    transitioned: bool,
    payment_kind: PaymentKind,
    payment_id: Uuid,
    deliveries: Vec<DeliveryLog>,
) -> ReconcileOutcome {
    if transitioned {
        return ReconcileOutcome::Delivered {
            payment_kind,
            payment_id,
            deliveries,
        };
    }

    if deliveries.is_empty() {
        info!(payment_kind = payment_kind.as_str(), payment_id = %payment_id, "payment already settled");
    } else {
        warn!(
            payment_kind = payment_kind.as_str(),
            payment_id = %payment_id,
            recovered = deliveries.len(),
            "recorded deliveries missing from an earlier confirmation"
        );
    }
    ReconcileOutcome::AlreadySettled {
        payment_kind,
        payment_id,
        recovered: deliveries.len(),
    }
}

fn delivered_items_json(deliveries: &[DeliveryLog]) -> serde_json::Value {
    deliveries
        .iter()
        .map(|delivery| {
            json!({
                "itemKey": delivery.item_key,
                "productName": delivery.product_name,
                "deliveryType": delivery.delivery_type.as_str(),
            })
        })
        .collect()
}

fn email_for(
    customer_name: &str,
    customer_email: &str,
    deliveries: &[DeliveryLog],
) -> Option<DeliverableEmail> {
    if deliveries.is_empty() {
        return None;
    }

    Some(DeliverableEmail {
        to: customer_email.to_string(),
        customer_name: customer_name.to_string(),
        items: deliveries
            .iter()
            .map(|delivery| DeliverableItem {
                product_name: delivery.product_name.clone(),
                delivery_type: delivery.delivery_type,
                payload: delivery.delivery_payload.clone(),
            })
            .collect(),
    })
}
