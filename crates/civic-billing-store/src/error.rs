//! Error types for civic-billing storage.

use civic_billing_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// The payment intent is already recorded on another transaction.
    #[error("duplicate payment intent: {payment_intent_id}")]
    DuplicatePaymentIntent {
        /// The payment intent that was duplicated.
        payment_intent_id: String,
    },

    /// A domain rule rejected the update.
    #[error(transparent)]
    Billing(#[from] BillingError),
}
