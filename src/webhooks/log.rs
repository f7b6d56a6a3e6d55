//! Append-only record of webhook delivery attempts.

use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use super::WebhookError;
use crate::payments::{StoreError, format_utc, parse_uuid};
use crate::types::{WebhookAttemptLog, WebhookAttemptOutcome};

#[derive(Debug, Clone)]
pub struct NewAttempt<'a> {
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_name: &'a str,
    pub attempt: u32,
    pub outcome: WebhookAttemptOutcome,
    pub response_status: Option<u16>,
    pub response_body: Option<&'a str>,
    pub error_message: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptCursor {
    pub created_at: String,
    pub id: Uuid,
}

#[derive(Debug, Clone)]
pub struct AttemptPage {
    pub attempts: Vec<WebhookAttemptLog>,
    pub next_before: Option<AttemptCursor>,
}

pub async fn record_attempt(pool: &SqlitePool, attempt: &NewAttempt<'_>) -> Result<(), WebhookError> {
    sqlx::query(
        r#"
        INSERT INTO webhook_logs (
            id,
            webhook_id,
            event_id,
            event_name,
            attempt,
            status,
            response_status,
            response_body,
            error_message,
            created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(attempt.webhook_id.to_string())
    .bind(attempt.event_id.to_string())
    .bind(attempt.event_name)
    .bind(i64::from(attempt.attempt))
    .bind(outcome_to_str(attempt.outcome))
    .bind(attempt.response_status.map(i64::from))
    .bind(attempt.response_body)
    .bind(attempt.error_message)
    .bind(format_utc(Utc::now()))
    .execute(pool)
    .await
    .map_err(|err| crate::payments::store::map_insert_error(err, "webhook attempt"))?;

    Ok(())
}

/// Attempts for one event instance, oldest first.
pub async fn attempts_for_event(
    pool: &SqlitePool,
    webhook_id: Uuid,
    event_id: Uuid,
) -> Result<Vec<WebhookAttemptLog>, WebhookError> {
    let rows = sqlx::query_as::<_, AttemptRow>(
        r#"
        SELECT id, webhook_id, event_id, event_name, attempt, status, response_status,
            response_body, error_message, created_at
        FROM webhook_logs
        WHERE webhook_id = ? AND event_id = ?
        ORDER BY attempt ASC
        "#,
    )
    .bind(webhook_id.to_string())
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AttemptRow::try_into).collect()
}

/// Newest-first page of a registration's attempts.
pub async fn list_attempts(
    pool: &SqlitePool,
    webhook_id: Uuid,
    limit: i64,
    before: Option<&AttemptCursor>,
) -> Result<AttemptPage, WebhookError> {
    let mut query = QueryBuilder::new(
        "SELECT id, webhook_id, event_id, event_name, attempt, status, response_status, \
            response_body, error_message, created_at \
        FROM webhook_logs \
        WHERE webhook_id = ",
    );
    query.push_bind(webhook_id.to_string());

    if let Some(cursor) = before {
        query.push(" AND (created_at < ");
        query.push_bind(cursor.created_at.clone());
        query.push(" OR (created_at = ");
        query.push_bind(cursor.created_at.clone());
        query.push(" AND id < ");
        query.push_bind(cursor.id.to_string());
        query.push("))");
    }

    query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    query.push_bind(limit + 1);

    let rows: Vec<AttemptRow> = query.build_query_as().fetch_all(pool).await?;

    let has_more = rows.len() > limit as usize;
    let mut attempts = Vec::with_capacity(rows.len().min(limit as usize));
    for row in rows.into_iter().take(limit as usize) {
        attempts.push(WebhookAttemptLog::try_from(row)?);
    }

    let next_before = if has_more {
        attempts.last().map(|last| AttemptCursor {
            created_at: last.created_at.clone(),
            id: last.id,
        })
    } else {
        None
    };

    Ok(AttemptPage {
        attempts,
        next_before,
    })
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    webhook_id: String,
    event_id: String,
    event_name: String,
    attempt: i64,
    status: String,
    response_status: Option<i64>,
    response_body: Option<String>,
    error_message: Option<String>,
    created_at: String,
}

impl TryFrom<AttemptRow> for WebhookAttemptLog {
    type Error = WebhookError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(WebhookAttemptLog {
            id: parse_uuid("attempt id", &row.id)?,
            webhook_id: parse_uuid("webhook id", &row.webhook_id)?,
            event_id: parse_uuid("event id", &row.event_id)?,
            event_name: row.event_name,
            attempt: row.attempt,
            outcome: parse_outcome(&row.status)?,
            response_status: row.response_status,
            response_body: row.response_body,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

fn outcome_to_str(outcome: WebhookAttemptOutcome) -> &'static str {
    match outcome {
        WebhookAttemptOutcome::Success => "success",
        WebhookAttemptOutcome::Failed => "failed",
        WebhookAttemptOutcome::Pending => "pending",
    }
}

fn parse_outcome(value: &str) -> Result<WebhookAttemptOutcome, StoreError> {
    match value {
        "success" => Ok(WebhookAttemptOutcome::Success),
        "failed" => Ok(WebhookAttemptOutcome::Failed),
        "pending" => Ok(WebhookAttemptOutcome::Pending),
        other => Err(StoreError::Parse(format!("unknown attempt status: {other}"))),
    }
}
