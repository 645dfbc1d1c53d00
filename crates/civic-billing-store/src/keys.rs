//! Key encoding utilities for `RocksDB`.
//!
//! Compound index keys are two 16-byte identifiers concatenated. ULIDs sort by
//! creation time, so a prefix scan yields records oldest first.

use civic_billing_core::{SubscriptionId, TransactionId, UserId};

/// Create a subscription key from a subscription ID.
#[must_use]
pub fn subscription_key(subscription_id: &SubscriptionId) -> Vec<u8> {
    subscription_id.to_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-subscription index key.
///
/// Format: `user_id (16 bytes) || subscription_id (16 bytes)`
#[must_use]
pub fn user_subscription_key(user_id: &UserId, subscription_id: &SubscriptionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&subscription_id.to_bytes());
    key
}

/// Create a prefix for iterating all subscriptions of a user.
#[must_use]
pub fn user_subscriptions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a subscription-transaction index key.
///
/// Format: `subscription_id (16 bytes) || transaction_id (16 bytes)`
#[must_use]
pub fn subscription_transaction_key(
    subscription_id: &SubscriptionId,
    transaction_id: &TransactionId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&subscription_id.to_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions of a subscription.
#[must_use]
pub fn subscription_transactions_prefix(subscription_id: &SubscriptionId) -> Vec<u8> {
    subscription_id.to_bytes().to_vec()
}

/// Create a payment intent index key.
#[must_use]
pub fn payment_intent_key(payment_intent_id: &str) -> Vec<u8> {
    payment_intent_id.as_bytes().to_vec()
}

/// Take the 16 bytes after the index prefix, if the key is long enough.
#[must_use]
pub fn trailing_id(key: &[u8]) -> Option<[u8; 16]> {
    key.get(16..32)?.try_into().ok()
}

/// Read a 16-byte identifier stored as an index value.
#[must_use]
pub fn id_value(value: &[u8]) -> Option<[u8; 16]> {
    value.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_key_length() {
        let key = subscription_key(&SubscriptionId::generate());
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn user_subscription_key_format() {
        let user_id = UserId::generate();
        let sub_id = SubscriptionId::generate();
        let key = user_subscription_key(&user_id, &sub_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], sub_id.to_bytes());
        assert!(key.starts_with(&user_subscriptions_prefix(&user_id)));
    }

    #[test]
    fn trailing_id_recovers_transaction() {
        let sub_id = SubscriptionId::generate();
        let tx_id = TransactionId::generate();
        let key = subscription_transaction_key(&sub_id, &tx_id);

        let extracted = trailing_id(&key).map(TransactionId::from_bytes);
        assert_eq!(extracted, Some(tx_id));
    }

    #[test]
    fn short_keys_have_no_trailing_id() {
        assert!(trailing_id(&[0u8; 20]).is_none());
        assert!(id_value(&[0u8; 15]).is_none());
    }
}
