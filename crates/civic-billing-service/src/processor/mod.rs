//! Payment processor abstraction.
//!
//! Handlers only talk to [`PaymentProcessor`]. The Stripe implementation lives
//! in [`stripe`]; tests inject their own.

use std::collections::BTreeMap;

use async_trait::async_trait;

use civic_billing_core::UserId;

pub mod stripe;
pub mod types;

pub use stripe::StripeProcessor;

/// Processor status for a payment that has been captured.
pub const INTENT_SUCCEEDED: &str = "succeeded";

/// Error type for payment processor operations.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor returned an error.
    #[error("processor API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// The requested object does not exist at the processor.
    #[error("not found at processor: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Request to create a payment intent.
#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
    /// Amount in whole rupees.
    pub amount: i64,

    /// ISO currency code.
    pub currency: String,

    /// Processor customer to charge.
    pub customer_id: Option<String>,

    /// Email the processor sends the receipt to.
    pub receipt_email: Option<String>,

    /// Statement description.
    pub description: String,

    /// Key/value metadata echoed back on webhooks.
    pub metadata: BTreeMap<String, String>,
}

/// A payment intent as seen by this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorIntent {
    /// Processor intent ID.
    pub id: String,

    /// Secret the client uses to confirm the payment.
    pub client_secret: Option<String>,

    /// Processor status, e.g. `requires_payment_method` or `succeeded`.
    pub status: String,

    /// Amount in whole rupees.
    pub amount: i64,

    /// Lowercase currency code.
    pub currency: String,

    /// Processor customer.
    pub customer_id: Option<String>,

    /// Receipt link, once a charge exists.
    pub receipt_url: Option<String>,

    /// Metadata attached at creation.
    pub metadata: BTreeMap<String, String>,
}

impl ProcessorIntent {
    /// Whether the payment has been captured.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.status == INTENT_SUCCEEDED
    }

    /// The `user_id` metadata entry, if present and well-formed.
    #[must_use]
    pub fn metadata_user_id(&self) -> Option<UserId> {
        self.metadata.get("user_id")?.parse().ok()
    }
}

/// A payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Key the client needs to complete checkout, if any.
    fn publishable_key(&self) -> Option<&str>;

    /// Return the processor customer for a user, creating one if needed.
    ///
    /// `existing` is a customer ID cached on an earlier subscription.
    async fn find_or_create_customer(
        &self,
        user_id: &UserId,
        email: &str,
        name: Option<&str>,
        existing: Option<&str>,
    ) -> Result<String, ProcessorError>;

    /// Create a payment intent.
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<ProcessorIntent, ProcessorError>;

    /// Fetch the current state of a payment intent.
    async fn retrieve_payment_intent(&self, id: &str) -> Result<ProcessorIntent, ProcessorError>;

    /// Cancel a recurring processor subscription.
    async fn cancel_subscription(&self, id: &str) -> Result<(), ProcessorError>;
}

/// Convert whole rupees to paise.
#[must_use]
pub const fn to_minor_units(amount: i64) -> i64 {
    amount * 100
}

/// Convert paise to whole rupees, rounding down.
#[must_use]
pub const fn from_minor_units(amount: i64) -> i64 {
    amount / 100
}
