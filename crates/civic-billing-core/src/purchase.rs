//! Plan selection and pricing for a checkout request.
//!
//! [`resolve_purchase`] applies the purchase rules against the user's existing
//! subscriptions and ledger and returns a [`PurchaseQuote`] describing what to
//! charge. It performs no I/O.

use chrono::{DateTime, Utc};

use crate::plan::PlanId;
use crate::subscription::{InitiatorProfile, PurchaseContext, Subscription, UserRole};
use crate::transaction::{Transaction, TransactionMode, TransactionStatus};
use crate::{BillingError, SubscriptionId, UserId};

/// A checkout request as received from the client.
#[derive(Debug, Clone, Default)]
pub struct PurchaseRequest {
    /// Requested plan identifier.
    pub plan: String,

    /// `"renew"` to ask for a renewal.
    pub mode: Option<String>,

    /// Requested purchase context.
    pub context: Option<String>,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Requester {
    /// Caller ID.
    pub user_id: UserId,

    /// Caller role.
    pub role: UserRole,

    /// Display name, if known.
    pub name: Option<String>,

    /// Email, if known.
    pub email: Option<String>,
}

/// Existing records of the requesting user.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurchaseHistory<'a> {
    /// All of the user's subscriptions.
    pub subscriptions: &'a [Subscription],

    /// All ledger entries belonging to those subscriptions.
    pub transactions: &'a [Transaction],
}

/// The outcome of resolving a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseQuote {
    /// Plan to charge for.
    pub plan: PlanId,

    /// Price in whole rupees.
    pub amount: i64,

    /// Whether the first-year price applies.
    pub is_first_year: bool,

    /// Ledger mode for the transaction.
    pub mode: TransactionMode,

    /// Effective purchase context.
    pub context: PurchaseContext,

    /// Audit snapshot of the caller.
    pub initiator: InitiatorProfile,

    /// Current same-plan subscription to extend instead of creating a new one.
    pub renew_in_place: Option<SubscriptionId>,
}

impl PurchaseQuote {
    /// Whether the quote can be fulfilled without a payment.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.amount == 0
    }
}

/// Resolve a checkout request into a quote.
///
/// # Errors
///
/// - `InvalidPlan` for identifiers outside the catalog.
/// - `PlanNotPurchasable` for institution-provisioned plans.
/// - `ParentPlanOnly` when a parent asks for anything but the parent plan.
/// - `DuplicateSubscription` when a current subscription to the plan exists
///   and this is not a renewal.
pub fn resolve_purchase(
    request: &PurchaseRequest,
    requester: &Requester,
    history: PurchaseHistory<'_>,
    now: DateTime<Utc>,
) -> crate::Result<PurchaseQuote> {
    let plan: PlanId = request.plan.parse()?;

    if plan.is_institutional() {
        return Err(BillingError::PlanNotPurchasable {
            plan: plan.to_string(),
        });
    }

    let context = PurchaseContext::normalize(request.context.as_deref(), requester.role);
    let is_parent = requester.role == UserRole::Parent || context == PurchaseContext::Parent;
    if is_parent && plan != PlanId::StudentParentPremiumPro {
        return Err(BillingError::ParentPlanOnly);
    }

    let initiator = InitiatorProfile::new(
        requester.user_id,
        requester.role,
        requester.name.as_deref(),
        requester.email.as_deref(),
        context,
    );

    let completed_before = history
        .transactions
        .iter()
        .any(|tx| tx.plan == plan && tx.status == TransactionStatus::Completed);
    let is_first_year = !completed_before;
    let renewal_flow = request.mode.as_deref() == Some("renew") || completed_before;

    let current = history
        .subscriptions
        .iter()
        .filter(|sub| sub.plan == plan && sub.is_current(now))
        .max_by_key(|sub| sub.created_at);

    let renew_in_place = match current {
        Some(sub) if !renewal_flow => {
            return Err(BillingError::DuplicateSubscription {
                subscription_id: sub.id.to_string(),
            });
        }
        Some(sub) => Some(sub.id),
        None => None,
    };

    Ok(PurchaseQuote {
        plan,
        amount: plan.price(is_first_year),
        is_first_year,
        mode: if renewal_flow {
            TransactionMode::Renewal
        } else {
            TransactionMode::Purchase
        },
        context,
        initiator,
        renew_in_place,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::SubscriptionStatus;
    use chrono::Duration;

    fn requester(role: UserRole) -> Requester {
        Requester {
            user_id: UserId::generate(),
            role,
            name: Some("Ravi".into()),
            email: Some("ravi@example.com".into()),
        }
    }

    fn request(plan: &str) -> PurchaseRequest {
        PurchaseRequest {
            plan: plan.into(),
            ..PurchaseRequest::default()
        }
    }

    fn active(user_id: UserId, plan: PlanId, now: DateTime<Utc>) -> Subscription {
        let mut sub = Subscription::pending(user_id, plan, true, now - Duration::days(300));
        sub.status = SubscriptionStatus::Active;
        sub.end_date = Some(now + Duration::days(65));
        sub
    }

    fn completed(sub: &Subscription, now: DateTime<Utc>) -> Transaction {
        let who = InitiatorProfile::new(
            sub.user_id,
            UserRole::Student,
            None,
            None,
            PurchaseContext::Student,
        );
        let mut tx = Transaction::pending_payment(
            sub.id,
            sub.user_id,
            sub.plan,
            sub.amount,
            TransactionMode::Purchase,
            who,
            "pi_old".into(),
            now - Duration::days(300),
        );
        tx.status = TransactionStatus::Completed;
        tx
    }

    #[test]
    fn unknown_plan_is_invalid() {
        let err = resolve_purchase(
            &request("platinum"),
            &requester(UserRole::Student),
            PurchaseHistory::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::InvalidPlan { .. }));
    }

    #[test]
    fn institutional_plan_is_not_purchasable() {
        let err = resolve_purchase(
            &request("educational_institutions_premium"),
            &requester(UserRole::Student),
            PurchaseHistory::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::PlanNotPurchasable { .. }));
    }

    #[test]
    fn parent_role_limited_to_parent_plan() {
        let err = resolve_purchase(
            &request("student_premium"),
            &requester(UserRole::Parent),
            PurchaseHistory::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::ParentPlanOnly));

        let quote = resolve_purchase(
            &request("student_parent_premium_pro"),
            &requester(UserRole::Parent),
            PurchaseHistory::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(quote.amount, 4999);
        assert_eq!(quote.context, PurchaseContext::Parent);
    }

    #[test]
    fn parent_context_limited_to_parent_plan() {
        let mut req = request("student_premium");
        req.context = Some("parent".into());
        let err = resolve_purchase(
            &req,
            &requester(UserRole::Student),
            PurchaseHistory::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::ParentPlanOnly));
    }

    #[test]
    fn first_purchase_uses_first_year_price() {
        let quote = resolve_purchase(
            &request("student_premium"),
            &requester(UserRole::Student),
            PurchaseHistory::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(quote.amount, 4499);
        assert!(quote.is_first_year);
        assert_eq!(quote.mode, TransactionMode::Purchase);
        assert!(quote.renew_in_place.is_none());
        assert_eq!(quote.initiator.name, "Ravi");
    }

    #[test]
    fn duplicate_current_subscription_is_rejected() {
        let now = Utc::now();
        let who = requester(UserRole::Student);
        let mut sub = active(who.user_id, PlanId::StudentPremium, now);
        sub.status = SubscriptionStatus::Active;
        let subs = [sub];
        let err = resolve_purchase(
            &request("student_premium"),
            &who,
            PurchaseHistory {
                subscriptions: &subs,
                transactions: &[],
            },
            now,
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::DuplicateSubscription { .. }));
    }

    #[test]
    fn explicit_renewal_extends_in_place() {
        let now = Utc::now();
        let who = requester(UserRole::Student);
        let subs = [active(who.user_id, PlanId::StudentPremium, now)];
        let txs = [completed(&subs[0], now)];
        let mut req = request("student_premium");
        req.mode = Some("renew".into());

        let quote = resolve_purchase(
            &req,
            &who,
            PurchaseHistory {
                subscriptions: &subs,
                transactions: &txs,
            },
            now,
        )
        .unwrap();
        assert_eq!(quote.amount, 999);
        assert!(!quote.is_first_year);
        assert_eq!(quote.mode, TransactionMode::Renewal);
        assert_eq!(quote.renew_in_place, Some(subs[0].id));
    }

    #[test]
    fn prior_completion_implies_renewal() {
        let now = Utc::now();
        let who = requester(UserRole::Student);
        let mut lapsed = active(who.user_id, PlanId::StudentPremium, now);
        lapsed.end_date = Some(now - Duration::days(5));
        let txs = [completed(&lapsed, now)];
        let subs = [lapsed];

        let quote = resolve_purchase(
            &request("student_premium"),
            &who,
            PurchaseHistory {
                subscriptions: &subs,
                transactions: &txs,
            },
            now,
        )
        .unwrap();
        assert_eq!(quote.mode, TransactionMode::Renewal);
        assert_eq!(quote.amount, 999);
        assert!(quote.renew_in_place.is_none());
    }

    #[test]
    fn renew_mode_without_history_still_charges_first_year() {
        let mut req = request("student_premium");
        req.mode = Some("renew".into());
        let quote = resolve_purchase(
            &req,
            &requester(UserRole::Student),
            PurchaseHistory::default(),
            Utc::now(),
        )
        .unwrap();
        assert!(quote.is_first_year);
        assert_eq!(quote.amount, 4499);
        assert_eq!(quote.mode, TransactionMode::Renewal);
    }

    #[test]
    fn free_plan_quote_is_free() {
        let quote = resolve_purchase(
            &request("free"),
            &requester(UserRole::Student),
            PurchaseHistory::default(),
            Utc::now(),
        )
        .unwrap();
        assert!(quote.is_free());
    }
}
