//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Subscription records, keyed by `subscription_id` (ULID).
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Index: subscriptions by user, keyed by `user_id || subscription_id`.
    /// Value is empty (index only).
    pub const SUBSCRIPTIONS_BY_USER: &str = "subscriptions_by_user";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by subscription, keyed by
    /// `subscription_id || transaction_id`. Value is empty (index only).
    pub const TRANSACTIONS_BY_SUBSCRIPTION: &str = "transactions_by_subscription";

    /// Unique index: payment intent to `transaction_id`.
    pub const TRANSACTIONS_BY_INTENT: &str = "transactions_by_intent";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::SUBSCRIPTIONS,
        cf::SUBSCRIPTIONS_BY_USER,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_SUBSCRIPTION,
        cf::TRANSACTIONS_BY_INTENT,
    ]
}
