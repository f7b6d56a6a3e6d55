#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::collections::HashSet;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use checkout::{
    handlers::router,
    payments::{list_delivery_logs, store},
    types::{PaymentKind, PaymentStatus},
    webhooks::{EventEnvelope, PAYMENT_COMPLETED},
};
use common::{
    FakeGateway, Harness, OWNER, TOKEN, dispatcher, harness, seed_checkout, seed_order_bump,
    seed_payment, seed_webhook, setup_db,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn callback(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn app(h: &Harness) -> Router {
    router(h.state.clone())
}

#[tokio::test]
async fn seller_routes_require_a_bearer_token() {
    let db = setup_db().await;
    let h = harness(&db.pool, FakeGateway::default());
    let app = app(&h);

    let request = Request::builder()
        .method("GET")
        .uri("/api/webhooks")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let request = Request::builder()
        .method("GET")
        .uri("/api/webhooks")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn charge_endpoint_returns_pix_payload() {
    let db = setup_db().await;
    let seeded = seed_checkout(&db.pool, OWNER).await;
    seed_order_bump(&db.pool, seeded.checkout_id, true).await;
    let h = harness(&db.pool, FakeGateway::default());
    let app = app(&h);

    let (status, body) = call(
        &app,
        authed(
            "POST",
            "/api/charges",
            Some(json!({
                "checkoutId": seeded.checkout_id,
                "amount": "97,00",
                "bumpAmount": 19.9,
                "customerName": "Ana Souza",
                "customerEmail": "ana@example.com",
                "customerDocument": "123.456.789-09",
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["loc"], "1");
    assert_eq!(body["copiaECola"], "00020126pix-1");
    assert_eq!(body["imagemQrcodeBase64"], "data:image/png;base64,AAAA");
    assert!(body["expiresAt"].as_str().unwrap().ends_with('Z'));

    let txid = body["txid"].as_str().unwrap();
    assert!(txid.starts_with("TX_"));
    let payment = store::find_payment_by_txid(&db.pool, txid)
        .await
        .unwrap()
        .expect("stored payment");
    assert_eq!(payment.amount_cents, 9700);
    assert_eq!(payment.bump_amount_cents, 1990);
    assert_eq!(payment.total_amount_cents, 11690);
    assert_eq!(payment.status, PaymentStatus::Pending);

    let charges = h.gateway.charges.lock().unwrap().clone();
    assert_eq!(charges[0].amount.cents(), 11690);
}

#[tokio::test]
async fn charge_endpoint_maps_failures_to_status_codes() {
    let db = setup_db().await;
    let seeded = seed_checkout(&db.pool, OWNER).await;

    let request = |checkout_id: uuid::Uuid, amount: Value| {
        authed(
            "POST",
            "/api/charges",
            Some(json!({
                "checkoutId": checkout_id,
                "amount": amount,
                "customerName": "Ana Souza",
                "customerEmail": "ana@example.com",
            })),
        )
    };

    let h = harness(&db.pool, FakeGateway::default());
    let app = app(&h);

    let (status, body) = call(&app, request(seeded.checkout_id, json!("abc"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = call(&app, request(seeded.checkout_id, json!(0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = call(&app, request(uuid::Uuid::new_v4(), json!(97))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(h.gateway.charge_count(), 0);

    let failing = harness(&db.pool, FakeGateway::failing(400));
    let failing_app = router(failing.state.clone());
    let (status, body) = call(&failing_app, request(seeded.checkout_id, json!(97))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "provider");
    assert!(body["details"].as_str().unwrap().contains("valor_invalido"));

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn charge_amounts_must_match_catalog_prices() {
    let db = setup_db().await;
    let seeded = seed_checkout(&db.pool, OWNER).await;
    let bare = seed_checkout(&db.pool, OWNER).await;
    seed_order_bump(&db.pool, seeded.checkout_id, true).await;
    let h = harness(&db.pool, FakeGateway::default());
    let app = app(&h);

    let request = |checkout_id: uuid::Uuid, amount: &str, bump: &str| {
        authed(
            "POST",
            "/api/charges",
            Some(json!({
                "checkoutId": checkout_id,
                "amount": amount,
                "bumpAmount": bump,
                "customerName": "Ana Souza",
                "customerEmail": "ana@example.com",
            })),
        )
    };

    for (checkout_id, amount, bump, message) in [
        (seeded.checkout_id, "0.01", "0.01", "product price"),
        (seeded.checkout_id, "97.00", "0.01", "order bump price"),
        (bare.checkout_id, "97.00", "19.90", "no active order bump"),
    ] {
        let (status, body) = call(&app, request(checkout_id, amount, bump)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"], "validation");
        assert!(body["message"].as_str().unwrap().contains(message), "{body}");
    }
    assert_eq!(h.gateway.charge_count(), 0);

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);

    let (status, body) = call(&app, request(seeded.checkout_id, "97.00", "19.90")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(h.gateway.charge_count(), 1);
}

#[tokio::test]
async fn pix_callback_confirms_and_delivers() {
    let db = setup_db().await;
    let seeded = seed_checkout(&db.pool, OWNER).await;
    let payment = seed_payment(&db.pool, seeded.checkout_id, "TXhttp", 9700, 0).await;
    let h = harness(&db.pool, FakeGateway::default());
    let app = app(&h);

    let body = json!({
        "pix": [
            { "endToEndId": "E1", "txid": "TXhttp", "valor": "97.00", "horario": "2026-01-01T10:00:00Z" },
            { "endToEndId": "E2", "txid": "TXunknown" },
            { "endToEndId": "E3" },
        ]
    })
    .to_string();

    let (status, response) = call(&app, callback("/api/pix/webhook/pix", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "success": true }));

    let stored = store::get_payment(&db.pool, payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Paid);

    // redelivery of the same batch does not deliver twice
    let (status, _) = call(&app, callback("/api/pix/webhook", &body)).await;
    assert_eq!(status, StatusCode::OK);
    let logs = list_delivery_logs(&db.pool, PaymentKind::Primary, payment.id)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn pix_callback_accepts_empty_ping_and_checks_token() {
    let db = setup_db().await;
    let mut h = harness(&db.pool, FakeGateway::default());

    let (status, response) = call(&app(&h), callback("/api/pix/webhook", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], true);

    h.state.pix_webhook_token = Some("cb-secret".to_string());
    let app = app(&h);

    let (status, _) = call(&app, callback("/api/pix/webhook?token=nope", "{}")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, callback("/api/pix/webhook", "{}")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, response) = call(&app, callback("/api/pix/webhook?token=cb-secret", "{}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], true);
}

#[tokio::test]
async fn cancel_is_owner_scoped_and_only_from_pending() {
    let db = setup_db().await;
    let mine = seed_checkout(&db.pool, OWNER).await;
    let theirs = seed_checkout(&db.pool, "seller-2").await;
    let payment = seed_payment(&db.pool, mine.checkout_id, "TXmine", 9700, 0).await;
    let foreign = seed_payment(&db.pool, theirs.checkout_id, "TXtheirs", 9700, 0).await;
    let h = harness(&db.pool, FakeGateway::default());
    let app = app(&h);

    let (status, _) = call(
        &app,
        authed("POST", &format!("/api/payments/{}/cancel", foreign.id), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/api/payments/{}/cancel", payment.id);
    let (status, body) = call(&app, authed("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["status"], "cancelled");

    let (status, body) = call(&app, authed("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = call(&app, authed("POST", "/api/payments/not-a-uuid/cancel", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn webhook_registration_lifecycle() {
    let db = setup_db().await;
    let h = harness(&db.pool, FakeGateway::default());
    let app = app(&h);

    let (status, created) = call(
        &app,
        authed(
            "POST",
            "/api/webhooks",
            Some(json!({
                "url": "https://seller.example/hooks",
                "events": [PAYMENT_COMPLETED],
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert!(created["secret"].as_str().unwrap().starts_with("whsec_"));
    assert_eq!(created["webhook"]["owner_id"], OWNER);
    assert_eq!(created["webhook"]["active"], true);
    let id = created["webhook"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        authed(
            "POST",
            "/api/webhooks",
            Some(json!({ "url": "ftp://seller.example", "events": [PAYMENT_COMPLETED] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    seed_webhook(&db.pool, "seller-2", "https://other.example/hooks", &[PAYMENT_COMPLETED]).await;

    let (status, listed) = call(&app, authed("GET", "/api/webhooks", None)).await;
    assert_eq!(status, StatusCode::OK);
    let webhooks = listed["webhooks"].as_array().unwrap();
    assert_eq!(webhooks.len(), 1);
    assert_eq!(webhooks[0]["id"], id.as_str());
    assert!(webhooks[0].get("secret").is_none());

    let (status, body) = call(
        &app,
        authed("POST", &format!("/api/webhooks/{id}/deactivate"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, _) = call(
        &app,
        authed(
            "POST",
            &format!("/api/webhooks/{}/deactivate", uuid::Uuid::new_v4()),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attempt_history_is_paginated_newest_first() {
    let db = setup_db().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let registration = seed_webhook(&db.pool, OWNER, &server.uri(), &[PAYMENT_COMPLETED]).await;
    let dispatcher = dispatcher(&db.pool);
    for n in 0..3 {
        let envelope = EventEnvelope::new(PAYMENT_COMPLETED, json!({ "n": n }));
        dispatcher.send(&registration, &envelope, 1).await.unwrap();
    }

    let h = harness(&db.pool, FakeGateway::default());
    let app = app(&h);
    let base = format!("/api/webhooks/{}/attempts", registration.id);

    let (status, first) = call(&app, authed("GET", &format!("{base}?limit=2"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let first_page = first["attempts"].as_array().unwrap();
    assert_eq!(first_page.len(), 2);
    assert!(first_page[0]["created_at"].as_str() >= first_page[1]["created_at"].as_str());
    let cursor = first["next_before"].as_str().expect("cursor").to_string();

    let (status, second) = call(
        &app,
        authed("GET", &format!("{base}?limit=2&before={cursor}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second_page = second["attempts"].as_array().unwrap();
    assert_eq!(second_page.len(), 1);
    assert!(second["next_before"].is_null());

    let ids: HashSet<&str> = first_page
        .iter()
        .chain(second_page)
        .map(|attempt| attempt["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);

    let (status, body) = call(&app, authed("GET", &format!("{base}?limit=500"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, _) = call(&app, authed("GET", &format!("{base}?before=garbage!"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let foreign = seed_webhook(&db.pool, "seller-2", &server.uri(), &[PAYMENT_COMPLETED]).await;
    let (status, _) = call(
        &app,
        authed("GET", &format!("/api/webhooks/{}/attempts", foreign.id), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
