//! Error types for civic-billing.

use crate::ids::IdError;

/// Result type for civic-billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in civic-billing domain operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The plan identifier is not in the catalog.
    #[error("Invalid plan type")]
    InvalidPlan {
        /// The identifier that was supplied.
        plan: String,
    },

    /// The plan cannot be bought through self-service checkout.
    #[error("Educational plans are provisioned directly by your institution.")]
    PlanNotPurchasable {
        /// The plan that was requested.
        plan: String,
    },

    /// Parents may only buy the parent-inclusive plan.
    #[error("Parents can only purchase the Student + Parent Premium Pro Plan")]
    ParentPlanOnly,

    /// The user already holds a current subscription for the plan.
    #[error("You already have an active subscription for this plan")]
    DuplicateSubscription {
        /// The existing subscription.
        subscription_id: String,
    },

    /// A subscription status change that the state machine forbids.
    #[error("invalid subscription transition from {from:?} to {to:?}")]
    InvalidSubscriptionTransition {
        /// The current status.
        from: crate::SubscriptionStatus,
        /// The requested status.
        to: crate::SubscriptionStatus,
    },

    /// A transaction status change that the state machine forbids.
    #[error("invalid transaction transition from {from:?} to {to:?}")]
    InvalidTransactionTransition {
        /// The current status.
        from: crate::TransactionStatus,
        /// The requested status.
        to: crate::TransactionStatus,
    },

    /// Subscription not found.
    #[error("subscription not found: {subscription_id}")]
    SubscriptionNotFound {
        /// The subscription ID that was not found.
        subscription_id: String,
    },

    /// Transaction not found.
    #[error("transaction not found: {transaction_id}")]
    TransactionNotFound {
        /// The transaction ID that was not found.
        transaction_id: String,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

impl BillingError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPlan { .. } => "INVALID_PLAN",
            Self::PlanNotPurchasable { .. } => "PLAN_NOT_PURCHASABLE",
            Self::ParentPlanOnly => "PARENT_PLAN_ONLY",
            Self::DuplicateSubscription { .. } => "DUPLICATE_SUBSCRIPTION",
            Self::InvalidSubscriptionTransition { .. }
            | Self::InvalidTransactionTransition { .. } => "INVALID_TRANSITION",
            Self::SubscriptionNotFound { .. } => "SUBSCRIPTION_NOT_FOUND",
            Self::TransactionNotFound { .. } => "TRANSACTION_NOT_FOUND",
            Self::InvalidId(_) => "INVALID_ID",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
        }
    }
}
