#![allow(clippy::expect_used, clippy::unwrap_used)]

use checkout::{
    charge::Amount,
    gateway::{ChargeRequest, GatewayConfig, GatewayError, Payer, PaymentGateway, PixGatewayClient},
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> PixGatewayClient {
    let config = GatewayConfig::new(server.uri(), "client-id", "client-secret", "pix-key@example.com");
    PixGatewayClient::with_http_client(config, reqwest::Client::new())
}

fn charge(txid: &str) -> ChargeRequest {
    ChargeRequest {
        txid: txid.to_string(),
        amount: Amount::from_cents(11690),
        expires_in_secs: 3600,
        payer: Payer {
            name: "Ana Souza".to_string(),
            document: Some("123.456.789-09".to_string()),
        },
        description: Some("Course".to_string()),
    }
}

async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({ "grant_type": "client_credentials" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn token_is_cached_between_calls() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;
    Mock::given(method("PUT"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "txid": "TXcached",
            "status": "ATIVA",
            "loc": { "id": 789 },
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let first = client.create_charge(&charge("TXcached1")).await.unwrap();
    let second = client.create_charge(&charge("TXcached2")).await.unwrap();

    assert_eq!(first.location_id, "789");
    assert_eq!(second.status.as_deref(), Some("ATIVA"));
}

#[tokio::test]
async fn charge_body_carries_amount_key_and_payer() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    Mock::given(method("PUT"))
        .and(path("/v2/cob/TXbody"))
        .and(body_partial_json(json!({
            "calendario": { "expiracao": 3600 },
            "valor": { "original": "116.90" },
            "chave": "pix-key@example.com",
            "devedor": { "cpf": "12345678909", "nome": "Ana Souza" },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "loc": { "id": "12" } })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server).create_charge(&charge("TXbody")).await.unwrap();
    assert_eq!(created.location_id, "12");
}

#[tokio::test]
async fn provider_rejection_keeps_status_and_payload() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "nome": "valor_invalido",
            "mensagem": "campo valor.original invalido",
        })))
        .mount(&server)
        .await;

    let err = client(&server).create_charge(&charge("TXbad")).await.unwrap_err();
    match err {
        GatewayError::ChargeCreation { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body["nome"], "valor_invalido");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn rejected_credentials_are_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).access_token().await.unwrap_err();
    assert!(matches!(err, GatewayError::Authentication(_)), "got {err:?}");
}

#[tokio::test]
async fn unauthorized_call_refreshes_token_once() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 2).await;
    Mock::given(method("GET"))
        .and(path("/v2/loc/7/qrcode"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/loc/7/qrcode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "qrcode": "00020126pix",
            "imagemQrcode": "data:image/png;base64,AAAA",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let qr = client(&server).fetch_qr_code("7").await.unwrap();
    assert_eq!(qr.copy_paste, "00020126pix");
    assert_eq!(qr.image, "data:image/png;base64,AAAA");
}

#[tokio::test]
async fn qr_code_failure_is_reported() {
    let server = MockServer::start().await;
    mount_token(&server, "tok", 1).await;
    Mock::given(method("GET"))
        .and(path("/v2/loc/9/qrcode"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "nome": "location_nao_encontrada" })))
        .mount(&server)
        .await;

    let err = client(&server).fetch_qr_code("9").await.unwrap_err();
    assert!(matches!(err, GatewayError::QrCode { status: 404, .. }), "got {err:?}");
}
