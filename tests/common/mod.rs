#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use checkout::{
    auth::StaticTokenVerifier,
    charge::{Amount, ChargeIssuer},
    email::{DeliverableEmail, DeliverableMailer, EmailError},
    gateway::{ChargeRequest, CreatedCharge, GatewayError, PaymentGateway, QrCode},
    payments::{NewPayment, format_utc, store},
    reconciler::DeliveryReconciler,
    state::AppState,
    types::{CreateWebhookRequest, OfferKind, PaymentRecord},
    upsell::SecondaryChargeIssuer,
    webhooks::{Registration, WebhookConfig, WebhookDispatcher, registry},
};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, SqlitePool};
use tempfile::NamedTempFile;
use uuid::Uuid;

pub const OWNER: &str = "seller-1";
pub const TOKEN: &str = "test-token";

pub struct TestDb {
    pub pool: SqlitePool,
    _db_file: NamedTempFile,
}

pub async fn setup_db() -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let mut conn = sqlx::SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite");

    let mut entries: Vec<_> = fs::read_dir("migrations")
        .expect("read migrations dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let contents = fs::read_to_string(entry.path()).expect("read migration");
        for stmt in contents.split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&mut conn)
                    .await
                    .expect("run migration");
            }
        }
    }
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("connect pool");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

pub struct SeededCheckout {
    pub checkout_id: Uuid,
    pub product_id: Uuid,
}

pub async fn seed_checkout(pool: &SqlitePool, owner_id: &str) -> SeededCheckout {
    let product_id = Uuid::new_v4();
    let checkout_id = Uuid::new_v4();
    let now = format_utc(Utc::now());

    sqlx::query(
        "INSERT INTO products (id, owner_id, name, price_cents, delivery_type, delivery_payload, created_at) \
         VALUES (?, ?, 'Course', 9700, 'link', 'https://files.example/course', ?)",
    )
    .bind(product_id.to_string())
    .bind(owner_id)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert product");

    sqlx::query("INSERT INTO checkouts (id, owner_id, product_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(checkout_id.to_string())
        .bind(owner_id)
        .bind(product_id.to_string())
        .bind(&now)
        .execute(pool)
        .await
        .expect("insert checkout");

    SeededCheckout {
        checkout_id,
        product_id,
    }
}

pub async fn seed_order_bump(pool: &SqlitePool, checkout_id: Uuid, active: bool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO order_bumps (id, checkout_id, product_name, price_cents, delivery_type, delivery_payload, active, created_at) \
         VALUES (?, ?, 'Workbook', 1990, 'file', 'https://files.example/workbook.pdf', ?, ?)",
    )
    .bind(id.to_string())
    .bind(checkout_id.to_string())
    .bind(active)
    .bind(format_utc(Utc::now()))
    .execute(pool)
    .await
    .expect("insert order bump");
    id
}

pub async fn seed_offer(
    pool: &SqlitePool,
    checkout_id: Uuid,
    kind: OfferKind,
    price_cents: i64,
    active: bool,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO offers (id, checkout_id, kind, product_name, price_cents, delivery_type, delivery_payload, active, created_at) \
         VALUES (?, ?, ?, 'Mentoring', ?, 'text', 'Book your call at https://cal.example/me', ?, ?)",
    )
    .bind(id.to_string())
    .bind(checkout_id.to_string())
    .bind(kind.as_str())
    .bind(price_cents)
    .bind(active)
    .bind(format_utc(Utc::now()))
    .execute(pool)
    .await
    .expect("insert offer");
    id
}

pub fn new_payment(checkout_id: Uuid, txid: &str, amount_cents: i64, bump_cents: i64) -> NewPayment {
    NewPayment {
        txid: txid.to_string(),
        checkout_id,
        customer_name: "Ana Souza".to_string(),
        customer_email: "ana@example.com".to_string(),
        customer_data: Some(json!({ "document": "12345678909" }).to_string()),
        amount: Amount::from_cents(amount_cents),
        bump_amount: Amount::from_cents(bump_cents),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        location_id: Some("loc-1".to_string()),
        pix_copy_paste: Some("00020126pix".to_string()),
        pix_qr_image: Some("data:image/png;base64,AAAA".to_string()),
    }
}

pub async fn seed_payment(
    pool: &SqlitePool,
    checkout_id: Uuid,
    txid: &str,
    amount_cents: i64,
    bump_cents: i64,
) -> PaymentRecord {
    store::create_payment(pool, &new_payment(checkout_id, txid, amount_cents, bump_cents))
        .await
        .expect("create payment")
}

pub async fn seed_webhook(pool: &SqlitePool, owner_id: &str, url: &str, events: &[&str]) -> Registration {
    let req = CreateWebhookRequest {
        url: url.to_string(),
        events: events.iter().map(|event| (*event).to_string()).collect(),
        headers: None,
    };
    registry::register(pool, owner_id, &req, true)
        .await
        .expect("register webhook")
}

pub fn fast_webhook_config() -> WebhookConfig {
    WebhookConfig {
        max_attempts: 5,
        timeout: Duration::from_secs(2),
        backoff_base: Duration::from_millis(10),
        allow_insecure: true,
        response_body_limit: 1000,
    }
}

pub fn dispatcher(pool: &SqlitePool) -> WebhookDispatcher {
    WebhookDispatcher::new(pool.clone(), fast_webhook_config()).expect("build dispatcher")
}

/// In-memory provider that records every charge it is asked for.
#[derive(Default)]
pub struct FakeGateway {
    pub charges: Mutex<Vec<ChargeRequest>>,
    pub fail_status: Option<u16>,
}

impl FakeGateway {
    pub fn failing(status: u16) -> Self {
        Self {
            charges: Mutex::new(Vec::new()),
            fail_status: Some(status),
        }
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError> {
        let mut charges = self.charges.lock().unwrap();
        charges.push(request.clone());
        if let Some(status) = self.fail_status {
            return Err(GatewayError::ChargeCreation {
                status,
                body: json!({ "nome": "valor_invalido", "mensagem": "rejected by fake" }),
            });
        }
        Ok(CreatedCharge {
            location_id: format!("{}", charges.len()),
            status: Some("ATIVA".to_string()),
        })
    }

    async fn fetch_qr_code(&self, location_id: &str) -> Result<QrCode, GatewayError> {
        Ok(QrCode {
            copy_paste: format!("00020126pix-{location_id}"),
            image: "data:image/png;base64,AAAA".to_string(),
        })
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<DeliverableEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<DeliverableEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverableMailer for RecordingMailer {
    async fn send_deliverables(&self, email: &DeliverableEmail) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn harness(pool: &SqlitePool, gateway: FakeGateway) -> Harness {
    let gateway = Arc::new(gateway);
    let mailer = Arc::new(RecordingMailer::default());
    let dispatcher = dispatcher(pool);

    let state = AppState {
        pool: pool.clone(),
        charges: ChargeIssuer::new(pool.clone(), gateway.clone(), dispatcher.clone(), 3600),
        upsells: SecondaryChargeIssuer::new(pool.clone(), gateway.clone(), dispatcher.clone(), 3600),
        reconciler: DeliveryReconciler::new(pool.clone(), dispatcher.clone(), mailer.clone()),
        dispatcher,
        identity: Some(Arc::new(StaticTokenVerifier::new(TOKEN, OWNER))),
        pix_webhook_token: None,
    };

    Harness {
        state,
        gateway,
        mailer,
    }
}

/// Polls `check` until it returns true or five seconds pass.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn attempt_count(pool: &SqlitePool, webhook_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM webhook_logs WHERE webhook_id = ?")
        .bind(webhook_id.to_string())
        .fetch_one(pool)
        .await
        .expect("count attempts")
}
