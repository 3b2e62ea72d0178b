use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::PaymentStatus;
use crate::services::lifecycle::Action;

/// Coarse error taxonomy exposed to clients alongside the specific code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum PayError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Only the sender of payment {0} may do this")]
    NotOwner(i64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payment {0} has already been paid")]
    AlreadyPaid(i64),

    #[error("Cannot {action} a payment in status {status}")]
    InvalidTransition {
        action: Action,
        status: PaymentStatus,
    },

    #[error("Payment {0} is still waiting for approval")]
    ApprovalPending(i64),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl PayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PayError::Validation(_) => ErrorKind::Validation,
            PayError::NotFound(_) => ErrorKind::NotFound,
            PayError::NotOwner(_) | PayError::Forbidden(_) => ErrorKind::Forbidden,
            PayError::AlreadyPaid(_)
            | PayError::InvalidTransition { .. }
            | PayError::ApprovalPending(_) => ErrorKind::Conflict,
            PayError::Upstream(_)
            | PayError::Database(_)
            | PayError::Migration(_)
            | PayError::Serialization(_)
            | PayError::InternalError(_)
            | PayError::AnyhowError(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            PayError::Validation(_) => "VALIDATION_ERROR",
            PayError::NotFound(_) => "NOT_FOUND",
            PayError::NotOwner(_) => "NOT_OWNER",
            PayError::Forbidden(_) => "FORBIDDEN",
            PayError::AlreadyPaid(_) => "ALREADY_PAID",
            PayError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PayError::ApprovalPending(_) => "APPROVAL_PENDING",
            PayError::Upstream(_) => "UPSTREAM_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PayError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        PayError::Forbidden(msg.into())
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub kind: ErrorKind,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for PayError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let kind = self.kind();
        let error_code = self.error_code();

        let status = match &self {
            PayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => kind.status_code(),
        };

        // storage details stay in the logs
        let message = match kind {
            ErrorKind::Internal if !matches!(self, PayError::Upstream(_)) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            error_code: error_code.to_string(),
            kind,
            timestamp: Utc::now(),
            request_id,
        };

        if kind == ErrorKind::Internal {
            tracing::error!(error = ?self, error_code = error_code, "Request failed");
        } else {
            tracing::warn!(error = %self, error_code = error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}
