//! Ledger transactions for civic-billing.
//!
//! Every payment attempt against a subscription is one transaction. Entries
//! are appended and then only move forward through their status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{PlanId, CURRENCY};
use crate::subscription::InitiatorProfile;
use crate::{BillingError, SubscriptionId, TransactionId, UserId};

/// Status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Payment intent created, not yet confirmed.
    Pending,

    /// Payment confirmed by the processor.
    Completed,

    /// Payment failed.
    Failed,
}

impl TransactionStatus {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// `Completed` is terminal. A failed attempt can still complete when the
    /// processor later succeeds on a retried intent.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::Failed) | (Self::Failed, Self::Completed)
        )
    }

    /// Checked transition.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidTransactionTransition` if the move is not allowed.
    pub fn transition_to(self, next: Self) -> crate::Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BillingError::InvalidTransactionTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Why a transaction exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// First purchase of a plan.
    Purchase,

    /// Renewal of a plan the user held before.
    Renewal,

    /// Created by the platform, e.g. free-plan activation.
    System,
}

impl TransactionMode {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Renewal => "renewal",
            Self::System => "system",
        }
    }
}

/// A ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// Subscription this payment is for.
    pub subscription_id: SubscriptionId,

    /// Owner of the subscription.
    pub user_id: UserId,

    /// Plan being paid for.
    #[serde(rename = "planType")]
    pub plan: PlanId,

    /// Amount in whole rupees.
    pub amount: i64,

    /// ISO currency code.
    pub currency: String,

    /// Payment status.
    pub status: TransactionStatus,

    /// Purchase, renewal or system grant.
    pub mode: TransactionMode,

    /// Who started the payment.
    pub initiated_by: InitiatorProfile,

    /// Processor payment intent. Unique across the ledger.
    pub payment_intent_id: Option<String>,

    /// Processor receipt link.
    pub receipt_url: Option<String>,

    /// When the payment completed.
    pub payment_date: Option<DateTime<Utc>>,

    /// Processor failure message.
    pub failure_reason: Option<String>,

    /// Free-form processor details.
    pub metadata: serde_json::Value,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// A completed zero-amount entry recording a platform grant.
    #[must_use]
    pub fn system_grant(
        subscription_id: SubscriptionId,
        plan: PlanId,
        initiated_by: InitiatorProfile,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            subscription_id,
            user_id: initiated_by.user_id,
            plan,
            amount: 0,
            currency: CURRENCY.to_string(),
            status: TransactionStatus::Completed,
            mode: TransactionMode::System,
            initiated_by,
            payment_intent_id: None,
            receipt_url: None,
            payment_date: Some(now),
            failure_reason: None,
            metadata: serde_json::json!({ "source": "free_activation" }),
            created_at: now,
        }
    }

    /// A pending entry for a freshly created payment intent.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn pending_payment(
        subscription_id: SubscriptionId,
        user_id: UserId,
        plan: PlanId,
        amount: i64,
        mode: TransactionMode,
        initiated_by: InitiatorProfile,
        payment_intent_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            subscription_id,
            user_id,
            plan,
            amount,
            currency: CURRENCY.to_string(),
            status: TransactionStatus::Pending,
            mode,
            initiated_by,
            payment_intent_id: Some(payment_intent_id),
            receipt_url: None,
            payment_date: None,
            failure_reason: None,
            metadata: serde_json::Value::Null,
            created_at: now,
        }
    }

    /// Whether this entry counts toward spend.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    /// Time used to order the ledger: the payment date, else creation time.
    #[must_use]
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.payment_date.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{PurchaseContext, UserRole};

    fn initiator() -> InitiatorProfile {
        InitiatorProfile::new(
            UserId::generate(),
            UserRole::Student,
            None,
            None,
            PurchaseContext::Student,
        )
    }

    #[test]
    fn completed_is_terminal() {
        for next in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
        ] {
            assert!(!TransactionStatus::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn failed_can_still_complete() {
        assert_eq!(
            TransactionStatus::Failed
                .transition_to(TransactionStatus::Completed)
                .unwrap(),
            TransactionStatus::Completed
        );
        assert!(TransactionStatus::Failed
            .transition_to(TransactionStatus::Pending)
            .is_err());
    }

    #[test]
    fn system_grant_is_completed_and_free() {
        let now = Utc::now();
        let tx = Transaction::system_grant(SubscriptionId::generate(), PlanId::Free, initiator(), now);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.mode, TransactionMode::System);
        assert_eq!(tx.amount, 0);
        assert_eq!(tx.currency, "INR");
        assert_eq!(tx.effective_date(), now);
    }

    #[test]
    fn pending_payment_carries_intent() {
        let now = Utc::now();
        let who = initiator();
        let tx = Transaction::pending_payment(
            SubscriptionId::generate(),
            who.user_id,
            PlanId::StudentPremium,
            4499,
            TransactionMode::Purchase,
            who,
            "pi_123".into(),
            now,
        );
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.payment_intent_id.as_deref(), Some("pi_123"));
        assert!(!tx.is_completed());
        assert_eq!(tx.effective_date(), now);
    }
}
