//! Core types and utilities for civic-billing.
//!
//! This crate provides the subscription domain used throughout the
//! civic-billing service:
//!
//! - **Identifiers**: `UserId`, `SubscriptionId`, `TransactionId`
//! - **Catalog**: `PlanId`, `PlanConfig`, `PlanFeatures`
//! - **Subscriptions**: `Subscription`, `SubscriptionStatus`, `AutoRenewSettings`
//! - **Ledger**: `Transaction`, `TransactionStatus`, `TransactionMode`
//! - **Rules**: `resolve_purchase`, `apply_confirmed_payment`, `build_ledger`
//!
//! # Amounts
//!
//! All amounts are whole rupees (`INR`) stored as `i64`. Conversion to the
//! processor's minor units happens at the processor boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod finalize;
pub mod ids;
pub mod ledger;
pub mod plan;
pub mod purchase;
pub mod subscription;
pub mod transaction;

pub use error::{BillingError, Result};
pub use finalize::{
    apply_confirmed_payment, apply_failed_payment, extended_end_date, ConfirmedPayment,
    FinalizeOutcome,
};
pub use ids::{IdError, SubscriptionId, TransactionId, UserId};
pub use ledger::{build_ledger, ActivePlanSummary, Ledger, LedgerEntry, LedgerSummary};
pub use plan::{
    PlanConfig, PlanFeatures, PlanId, CURRENCY, HISTORY_LIMIT, RENEWAL_WINDOW_DAYS,
    SUBSCRIPTION_TERM_DAYS,
};
pub use purchase::{resolve_purchase, PurchaseHistory, PurchaseQuote, PurchaseRequest, Requester};
pub use subscription::{
    Attribution, AutoRenewSettings, AutoRenewUpdate, InitiatorProfile, MandateStatus,
    PurchaseContext, Subscription, SubscriptionStatus, UserRole,
};
pub use transaction::{Transaction, TransactionMode, TransactionStatus};
