use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::store::expire_overdue;

/// Periodically expires pending payments whose charge TTL has passed.
pub fn spawn_expiry_sweep(pool: SqlitePool, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match expire_overdue(&pool, Utc::now()).await {
                Ok(0) => {}
                Ok(expired) => info!(expired, "expired overdue pending payments"),
                Err(err) => error!(error = %err, "payment expiry sweep failed"),
            }
        }
    })
}
