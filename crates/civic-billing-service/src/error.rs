//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use civic_billing_core::BillingError;
use civic_billing_store::StoreError;

use crate::processor::ProcessorError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but the action is not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("{0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// A billing rule rejected the request.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// A required integration is not configured. The message is shown to the caller.
    #[error("{0}")]
    NotConfigured(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// HTTP status for a billing rule violation.
fn billing_status(err: &BillingError) -> StatusCode {
    match err {
        BillingError::PlanNotPurchasable { .. } => StatusCode::FORBIDDEN,
        BillingError::SubscriptionNotFound { .. } | BillingError::TransactionNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        BillingError::InvalidSubscriptionTransition { .. }
        | BillingError::InvalidTransactionTransition { .. } => StatusCode::CONFLICT,
        BillingError::InvalidPlan { .. }
        | BillingError::ParentPlanOnly
        | BillingError::DuplicateSubscription { .. }
        | BillingError::InvalidId(_)
        | BillingError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::Billing(err) => {
                let details = match err {
                    BillingError::DuplicateSubscription { subscription_id } => {
                        Some(serde_json::json!({ "subscriptionId": subscription_id }))
                    }
                    BillingError::InvalidPlan { plan } => {
                        Some(serde_json::json!({ "planType": plan }))
                    }
                    _ => None,
                };
                (billing_status(err), err.code(), err.to_string(), details)
            }
            Self::NotConfigured(msg) => {
                tracing::warn!(error = %msg, "Integration not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "not_configured",
                    msg.clone(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => {
                tracing::error!(error = %msg, "Payment processor error");
                (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    msg.clone(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("Subscription not found".into()),
            StoreError::DuplicatePaymentIntent { payment_intent_id } => Self::Conflict(format!(
                "Payment intent {payment_intent_id} is already recorded"
            )),
            StoreError::Billing(err) => Self::Billing(err),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<ProcessorError> for ApiError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::NotFound(id) => Self::NotFound(format!("Payment intent not found: {id}")),
            ProcessorError::Api { message, .. } => Self::ExternalService(message),
            ProcessorError::Http(e) => Self::ExternalService(e.to_string()),
            ProcessorError::Serialization(e) => Self::ExternalService(e.to_string()),
        }
    }
}
