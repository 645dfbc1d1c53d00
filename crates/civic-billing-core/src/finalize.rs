//! Applying processor payment results to subscriptions and the ledger.
//!
//! Both the client verification path and the webhook path end here, so a
//! payment is applied the same way regardless of which one arrives first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::subscription_term;
use crate::subscription::{Attribution, Subscription, SubscriptionStatus};
use crate::transaction::{Transaction, TransactionMode, TransactionStatus};

/// A payment the processor reports as succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedPayment {
    /// Processor payment intent.
    pub payment_intent_id: String,

    /// Processor status string, e.g. `succeeded`.
    pub payment_status: String,

    /// Receipt link, if the processor provided one.
    pub receipt_url: Option<String>,
}

/// Result of finalizing a confirmed payment.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// The payment was applied now.
    Updated {
        /// The subscription after extension.
        subscription: Subscription,
        /// The completed transaction.
        transaction: Transaction,
    },

    /// The payment had been applied before. Nothing changed.
    AlreadyCompleted {
        /// The subscription as stored.
        subscription: Subscription,
        /// The transaction as stored.
        transaction: Transaction,
    },

    /// No transaction matches the payment.
    NotMatched,
}

impl FinalizeOutcome {
    /// The resulting subscription, if one matched.
    #[must_use]
    pub fn subscription(&self) -> Option<&Subscription> {
        match self {
            Self::Updated { subscription, .. } | Self::AlreadyCompleted { subscription, .. } => {
                Some(subscription)
            }
            Self::NotMatched => None,
        }
    }

    /// Whether this call changed anything.
    #[must_use]
    pub const fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

/// End date after one more term: stacked onto remaining validity, or
/// starting from `now` when there is none left.
#[must_use]
pub fn extended_end_date(current_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let base = current_end.filter(|end| *end > now).unwrap_or(now);
    base + subscription_term()
}

/// Apply a confirmed payment to its transaction and subscription.
///
/// A transaction that is already `Completed` is returned unchanged as
/// `AlreadyCompleted`, so repeated confirmations never extend the term twice.
///
/// # Errors
///
/// Returns a transition error if the subscription cannot be activated.
pub fn apply_confirmed_payment(
    mut subscription: Subscription,
    mut transaction: Transaction,
    payment: &ConfirmedPayment,
    now: DateTime<Utc>,
) -> crate::Result<FinalizeOutcome> {
    if transaction.status == TransactionStatus::Completed {
        return Ok(FinalizeOutcome::AlreadyCompleted {
            subscription,
            transaction,
        });
    }

    transaction.status = transaction.status.transition_to(TransactionStatus::Completed)?;
    subscription.status = subscription.status.transition_to(SubscriptionStatus::Active)?;

    transaction.payment_date = Some(now);
    transaction.failure_reason = None;
    if payment.receipt_url.is_some() {
        transaction.receipt_url.clone_from(&payment.receipt_url);
    }
    merge_metadata(
        &mut transaction.metadata,
        "payment_status",
        serde_json::Value::String(payment.payment_status.clone()),
    );

    subscription.end_date = Some(extended_end_date(subscription.end_date, now));
    subscription.amount = transaction.amount;
    subscription.last_payment_at = Some(now);
    subscription.cancelled_at = None;

    let attribution = Attribution {
        initiator: transaction.initiated_by.clone(),
        at: now,
    };
    if transaction.mode == TransactionMode::Renewal {
        subscription.renewal_count += 1;
        subscription.last_renewed_by = Some(attribution);
    } else if subscription.purchased_by.is_none() {
        subscription.purchased_by = Some(attribution);
    }
    subscription.updated_at = now;

    Ok(FinalizeOutcome::Updated {
        subscription,
        transaction,
    })
}

/// Mark a transaction failed. The subscription is left as it is.
///
/// Returns `false` when the transaction is already completed or failed.
pub fn apply_failed_payment(transaction: &mut Transaction, reason: &str) -> bool {
    let Ok(next) = transaction.status.transition_to(TransactionStatus::Failed) else {
        return false;
    };
    transaction.status = next;
    transaction.failure_reason = Some(reason.to_string());
    merge_metadata(
        &mut transaction.metadata,
        "failure_reason",
        serde_json::Value::String(reason.to_string()),
    );
    true
}

fn merge_metadata(metadata: &mut serde_json::Value, key: &str, value: serde_json::Value) {
    if !metadata.is_object() {
        *metadata = serde_json::Value::Object(serde_json::Map::new());
    }
    if let Some(map) = metadata.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}
