use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::charge::{ChargeError, ValidationError};
use crate::gateway::GatewayError;
use crate::payments::StoreError;
use crate::reconciler::ReconcileError;
use crate::types::{ApiErrorCode, ApiErrorResponse};
use crate::upsell::IssueError;
use crate::webhooks::WebhookError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Provider {
        status: StatusCode,
        message: String,
        details: Option<String>,
    },
    #[error(transparent)]
    Store(StoreError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::NotFound(message) => Self::NotFound(message),
            other => Self::Store(other),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Db(err))
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::ChargeCreation { status, .. } | GatewayError::QrCode { status, .. } => {
                StatusCode::from_u16(*status)
                    .ok()
                    .filter(|code| code.is_client_error() || code.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::BAD_GATEWAY,
        };
        let message = match &err {
            GatewayError::ChargeCreation { .. } => "could not create pix charge",
            GatewayError::QrCode { .. } => "could not fetch pix qr code",
            GatewayError::Authentication(_) | GatewayError::Certificate(_) => {
                "payment provider credentials rejected"
            }
            GatewayError::Transport(_) => "payment provider unreachable",
            GatewayError::Config(_) => "payment provider misconfigured",
        };
        let details = match err.provider_body() {
            Some(body) => Some(body.to_string()),
            None => Some(err.to_string()),
        };

        Self::Provider {
            status,
            message: message.to_string(),
            details,
        }
    }
}

impl From<ChargeError> for ApiError {
    fn from(err: ChargeError) -> Self {
        match err {
            ChargeError::Validation(err) => err.into(),
            ChargeError::CheckoutNotFound(id) => Self::NotFound(format!("checkout {id} not found")),
            ChargeError::Gateway(err) => err.into(),
            ChargeError::Store(err) => err.into(),
        }
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::PaymentNotFound(_) | IssueError::OfferNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            IssueError::ParentNotPaid(_) | IssueError::OfferUnavailable(_) => {
                Self::Conflict(err.to_string())
            }
            IssueError::Gateway(err) => err.into(),
            IssueError::Store(err) => err.into(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::InvalidUrl(_) | WebhookError::InvalidRegistration(_) => {
                Self::Validation(err.to_string())
            }
            WebhookError::Store(err) => err.into(),
            WebhookError::Serialize(err) => Self::Internal(err.to_string()),
            WebhookError::Client(message) => Self::Internal(message),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, ApiErrorCode::Validation, message, None)
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, ApiErrorCode::Unauthorized, message, None)
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, ApiErrorCode::NotFound, message, None)
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, ApiErrorCode::Conflict, message, None)
            }
            ApiError::Provider {
                status,
                message,
                details,
            } => (status, ApiErrorCode::Provider, message, details),
            ApiError::Store(err) => {
                error!(error = %err, "store error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorCode::Database,
                    "database error".to_string(),
                    None,
                )
            }
            ApiError::Internal(message) => {
                error!(error = %message, "internal error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorCode::Internal,
                    "internal error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(ApiErrorResponse {
                error: code,
                message,
                details,
            }),
        )
            .into_response()
    }
}
