//! `RocksDB` storage layer for civic-billing.
//!
//! This crate persists subscriptions and their ledger transactions using
//! `RocksDB` with column families for indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `subscriptions`: Subscription records, keyed by `subscription_id` (ULID)
//! - `subscriptions_by_user`: Index for listing subscriptions by user
//! - `transactions`: Ledger transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_subscription`: Index for listing a subscription's ledger
//! - `transactions_by_intent`: Unique payment intent index
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use civic_billing_core::{InitiatorProfile, PurchaseContext, Subscription, UserId, UserRole};
//! use civic_billing_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/civic-billing-db").unwrap();
//!
//! let user_id = UserId::generate();
//! let who = InitiatorProfile::new(user_id, UserRole::Student, None, None, PurchaseContext::Student);
//! let subscription = Subscription::activated_free(who, Utc::now());
//! store.put_subscription(&subscription).unwrap();
//!
//! let current = store.find_active_subscription(&user_id, Utc::now()).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use civic_billing_core::{
    ConfirmedPayment, FinalizeOutcome, Subscription, SubscriptionId, Transaction, TransactionId,
    UserId,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Insert or update a subscription record.
    ///
    /// This also maintains the user index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Get a subscription by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, subscription_id: &SubscriptionId) -> Result<Option<Subscription>>;

    /// List a user's subscriptions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_subscriptions_by_user(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Subscription>>;

    /// The user's newest subscription that is active and not past its end date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_active_subscription(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .list_subscriptions_by_user(user_id, None)?
            .into_iter()
            .find(|sub| sub.is_current(now)))
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// List a subscription's transactions in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<Transaction>>;

    /// Look up the transaction recorded for a payment intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Transaction>>;

    /// Every transaction across all of a user's subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        for sub in self.list_subscriptions_by_user(user_id, None)? {
            transactions.extend(self.list_transactions_by_subscription(&sub.id)?);
        }
        Ok(transactions)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Create a subscription together with its first transaction atomically.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicatePaymentIntent` if the transaction's intent is
    ///   already recorded.
    fn create_subscription(
        &self,
        subscription: &Subscription,
        transaction: &Transaction,
    ) -> Result<()>;

    /// Append a transaction to an existing subscription's ledger atomically.
    ///
    /// The subscription is re-read under the write lock, so a payment
    /// finalized since the caller last read it is kept. Only the processor
    /// customer reference is applied from the caller. Returns the stored
    /// subscription.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the subscription doesn't exist.
    /// - `StoreError::DuplicatePaymentIntent` if the transaction's intent is
    ///   already recorded.
    fn append_transaction(
        &self,
        transaction: &Transaction,
        processor_customer_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Subscription>;

    /// Read, modify and write a subscription under the write lock.
    ///
    /// Nothing is written when `update` fails. Returns the stored subscription.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the subscription doesn't exist.
    /// - Whatever `update` returns.
    fn update_subscription<F>(&self, subscription_id: &SubscriptionId, update: F) -> Result<Subscription>
    where
        F: FnOnce(&mut Subscription) -> Result<()>;

    /// Finalize a confirmed payment.
    ///
    /// Runs under the store's write lock. A transaction that is already
    /// completed is reported as `AlreadyCompleted` without touching the
    /// subscription, so concurrent confirmations extend the term once.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the subscription
    /// cannot be activated.
    fn complete_payment(
        &self,
        payment: &ConfirmedPayment,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome>;

    /// Mark the transaction of a payment intent failed.
    ///
    /// Returns the stored transaction, or `None` when no transaction matches.
    /// Completed transactions are left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn fail_payment(&self, payment_intent_id: &str, reason: &str) -> Result<Option<Transaction>>;
}
