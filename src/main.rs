use std::net::SocketAddr;
use std::sync::Arc;

use checkout::{
    charge::ChargeIssuer,
    config::AppConfig,
    email::mailer_from_config,
    gateway::{ClientIdentity, PaymentGateway, PixGatewayClient},
    handlers::router,
    payments::spawn_expiry_sweep,
    reconciler::DeliveryReconciler,
    state::AppState,
    upsell::SecondaryChargeIssuer,
    webhooks::WebhookDispatcher,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("checkout=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let connect_options = config
        .database_url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let (Some(cert_path), Some(key_path)) = (&config.gateway.cert_path, &config.gateway.key_path)
    else {
        return Err("PIX_CERT_PATH and PIX_KEY_PATH are required".into());
    };
    let identity = ClientIdentity::from_files(cert_path, key_path)?;
    let charge_ttl_secs = config.gateway.charge_ttl_secs;
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(PixGatewayClient::new(config.gateway.clone(), &identity)?);
    info!(gateway = ?config.gateway, "payment gateway ready");

    let dispatcher = WebhookDispatcher::new(pool.clone(), config.webhooks.clone())?;
    let mailer = mailer_from_config(&config.email)?;

    let identity_verifier = config.identity.verifier()?;
    if identity_verifier.is_none() {
        warn!("no identity service configured; authenticated routes will reject every request");
    }
    if config.pix_webhook_token.is_none() {
        warn!("PIX_WEBHOOK_TOKEN is not set; provider callbacks are not authenticated");
    }

    if let Some(period) = config.expiry_sweep {
        spawn_expiry_sweep(pool.clone(), period);
    }

    let state = AppState {
        pool: pool.clone(),
        charges: ChargeIssuer::new(
            pool.clone(),
            Arc::clone(&gateway),
            dispatcher.clone(),
            charge_ttl_secs,
        ),
        upsells: SecondaryChargeIssuer::new(
            pool.clone(),
            Arc::clone(&gateway),
            dispatcher.clone(),
            charge_ttl_secs,
        ),
        reconciler: DeliveryReconciler::new(pool.clone(), dispatcher.clone(), mailer),
        dispatcher,
        identity: identity_verifier,
        pix_webhook_token: config.pix_webhook_token.clone(),
    };

    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "checkout listening");
    axum::serve(listener, app).await?;

    Ok(())
}
