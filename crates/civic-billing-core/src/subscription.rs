//! Subscription records for civic-billing.
//!
//! A subscription is one user's entitlement to one plan for a bounded term.
//! Payment history lives in the transaction ledger, not on this record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::plan::{renewal_window, subscription_term, PlanFeatures, PlanId};
use crate::{BillingError, SubscriptionId, UserId};

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created for a paid plan, waiting on payment confirmation.
    Pending,

    /// Entitlements are granted until the end date.
    Active,

    /// Cancelled by the user.
    Cancelled,

    /// The term ran out.
    Expired,
}

impl SubscriptionStatus {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// A confirmed payment may reactivate a cancelled or expired record, and
    /// an active record may be confirmed again to extend its term.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        use SubscriptionStatus::{Active, Cancelled, Expired, Pending};

        matches!(
            (self, next),
            (Pending, Active | Cancelled | Expired)
                | (Active, Active | Cancelled | Expired)
                | (Cancelled | Expired, Active)
        )
    }

    /// Checked transition.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidSubscriptionTransition` if the move is not allowed.
    pub fn transition_to(self, next: Self) -> crate::Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BillingError::InvalidSubscriptionTransition {
                from: self,
                to: next,
            })
        }
    }
}

// ============================================================================
// Initiators
// ============================================================================

/// Role of the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Learner.
    Student,
    /// Parent or guardian.
    Parent,
    /// Teacher.
    Educator,
    /// Platform administrator.
    Admin,
    /// School administrator.
    SchoolAdmin,
    /// Any role this service does not distinguish.
    #[serde(other)]
    Other,
}

impl UserRole {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Parent => "parent",
            Self::Educator => "educator",
            Self::Admin => "admin",
            Self::SchoolAdmin => "school_admin",
            Self::Other => "other",
        }
    }
}

impl FromStr for UserRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "student" => Self::Student,
            "parent" => Self::Parent,
            "educator" | "teacher" => Self::Educator,
            "admin" => Self::Admin,
            "school_admin" => Self::SchoolAdmin,
            _ => Self::Other,
        })
    }
}

/// On whose behalf a purchase is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseContext {
    /// A learner buying for themselves.
    Student,
    /// A parent buying for a child.
    Parent,
    /// An administrator acting for a user.
    Admin,
    /// Automatic activity such as free-plan activation.
    System,
}

impl PurchaseContext {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Parent => "parent",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    /// Resolve the effective context.
    ///
    /// An explicit, recognized context wins. Otherwise the caller's role is
    /// used when it names a context, falling back to `Student`.
    #[must_use]
    pub fn normalize(requested: Option<&str>, role: UserRole) -> Self {
        let explicit = requested.and_then(|value| match value {
            "student" => Some(Self::Student),
            "parent" => Some(Self::Parent),
            "admin" => Some(Self::Admin),
            "system" => Some(Self::System),
            _ => None,
        });

        explicit.unwrap_or(match role {
            UserRole::Parent => Self::Parent,
            UserRole::Admin => Self::Admin,
            _ => Self::Student,
        })
    }
}

/// Snapshot of who started a purchase, renewal or settings change.
///
/// This is an audit copy taken at the time of the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatorProfile {
    /// Acting user.
    pub user_id: UserId,

    /// Role at the time of the action.
    pub role: UserRole,

    /// Display name, `"Unknown"` when the token carried none.
    pub name: String,

    /// Email, if known.
    pub email: Option<String>,

    /// Purchase context.
    pub context: PurchaseContext,
}

impl InitiatorProfile {
    /// Build a snapshot, applying the name fallback.
    #[must_use]
    pub fn new(
        user_id: UserId,
        role: UserRole,
        name: Option<&str>,
        email: Option<&str>,
        context: PurchaseContext,
    ) -> Self {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Unknown")
            .to_string();
        Self {
            user_id,
            role,
            name,
            email: email.map(ToString::to_string),
            context,
        }
    }
}

/// An initiator together with when they acted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    /// Who acted.
    pub initiator: InitiatorProfile,

    /// When.
    pub at: DateTime<Utc>,
}

// ============================================================================
// Auto-renew
// ============================================================================

/// Mandate state for recurring debits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateStatus {
    /// A mandate must still be set up with the processor.
    Pending,
    /// Auto-renew is off, no mandate is needed.
    NotRequired,
}

/// Stored auto-renew preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRenewSettings {
    /// Whether renewal should be charged automatically.
    pub enabled: bool,

    /// Payment method kind, e.g. `card` or `upi`.
    pub method: Option<String>,

    /// Processor payment method reference.
    pub payment_method_id: Option<String>,

    /// Label shown to the user.
    pub payment_method_label: Option<String>,

    /// Last four digits of a card.
    pub last_four: Option<String>,

    /// Card brand.
    pub brand: Option<String>,

    /// Mandate state.
    pub mandate_status: MandateStatus,

    /// When the next automatic debit is due.
    pub next_debit_date: Option<DateTime<Utc>>,

    /// When the settings last changed.
    pub updated_at: DateTime<Utc>,

    /// Who last changed the settings.
    pub updated_by: Option<InitiatorProfile>,
}

/// A partial update to auto-renew settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoRenewUpdate {
    /// New enabled flag.
    pub enabled: Option<bool>,
    /// New payment method kind.
    pub method: Option<String>,
    /// New payment method reference.
    pub payment_method_id: Option<String>,
    /// New label.
    pub payment_method_label: Option<String>,
    /// New last four digits.
    pub last_four: Option<String>,
    /// New card brand.
    pub brand: Option<String>,
}

impl AutoRenewUpdate {
    /// True when no field was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A user's subscription to one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Unique subscription ID (ULID for time-ordering).
    pub id: SubscriptionId,

    /// Owner.
    pub user_id: UserId,

    /// Catalog plan.
    #[serde(rename = "planType")]
    pub plan: PlanId,

    /// Plan name at creation time.
    pub plan_name: String,

    /// Price charged for the current term, in whole rupees.
    pub amount: i64,

    /// Catalog first-year price at creation time.
    pub first_year_amount: i64,

    /// Catalog renewal price at creation time.
    pub renewal_amount: i64,

    /// Whether the current term is the user's first on this plan.
    pub is_first_year: bool,

    /// Lifecycle status as stored.
    pub status: SubscriptionStatus,

    /// When the record was started.
    pub start_date: DateTime<Utc>,

    /// End of the paid term. `None` until the first payment is confirmed.
    pub end_date: Option<DateTime<Utc>>,

    /// Entitlements at creation time.
    pub features: PlanFeatures,

    /// Number of confirmed renewals.
    pub renewal_count: u32,

    /// Quick flag mirroring `auto_renew_settings.enabled`.
    pub auto_renew: bool,

    /// Stored auto-renew preferences.
    pub auto_renew_settings: Option<AutoRenewSettings>,

    /// First successful purchaser.
    pub purchased_by: Option<Attribution>,

    /// Most recent renewer.
    pub last_renewed_by: Option<Attribution>,

    /// Payment processor customer reference.
    pub processor_customer_id: Option<String>,

    /// Payment processor recurring subscription reference.
    ///
    /// Checkout never sets this. It is provisioned out-of-band when a
    /// recurring mandate is created with the processor, and cancelling the
    /// subscription cancels the mirrored one on a best-effort basis.
    pub processor_subscription_id: Option<String>,

    /// Time of the last confirmed payment.
    pub last_payment_at: Option<DateTime<Utc>>,

    /// Time of user cancellation.
    pub cancelled_at: Option<DateTime<Utc>>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    fn base(user_id: UserId, plan: PlanId, is_first_year: bool, now: DateTime<Utc>) -> Self {
        let config = plan.config();
        Self {
            id: SubscriptionId::generate(),
            user_id,
            plan,
            plan_name: config.name.to_string(),
            amount: plan.price(is_first_year),
            first_year_amount: config.first_year_amount,
            renewal_amount: config.renewal_amount,
            is_first_year,
            status: SubscriptionStatus::Pending,
            start_date: now,
            end_date: None,
            features: config.features,
            renewal_count: 0,
            auto_renew: false,
            auto_renew_settings: None,
            purchased_by: None,
            last_renewed_by: None,
            processor_customer_id: None,
            processor_subscription_id: None,
            last_payment_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A free-plan subscription, active immediately for one term.
    #[must_use]
    pub fn activated_free(initiator: InitiatorProfile, now: DateTime<Utc>) -> Self {
        let mut subscription = Self::base(initiator.user_id, PlanId::Free, true, now);
        subscription.status = SubscriptionStatus::Active;
        subscription.end_date = Some(now + subscription_term());
        subscription.purchased_by = Some(Attribution { initiator, at: now });
        subscription
    }

    /// A paid-plan subscription awaiting its first confirmed payment.
    #[must_use]
    pub fn pending(
        user_id: UserId,
        plan: PlanId,
        is_first_year: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self::base(user_id, plan, is_first_year, now)
    }

    /// The implicit free plan shown to users with no current subscription.
    ///
    /// Never persisted.
    #[must_use]
    pub fn synthesized_free(user_id: UserId, now: DateTime<Utc>) -> Self {
        let mut subscription = Self::base(user_id, PlanId::Free, true, now);
        subscription.status = SubscriptionStatus::Active;
        subscription
    }

    /// Status as seen at `now`.
    ///
    /// An active record whose end date has passed reads as expired. Nothing
    /// writes this back.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        match (self.status, self.end_date) {
            (SubscriptionStatus::Active, Some(end)) if end <= now => SubscriptionStatus::Expired,
            (status, _) => status,
        }
    }

    /// Whether the subscription currently grants its entitlements.
    #[must_use]
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == SubscriptionStatus::Active
    }

    /// Whole days left in the term, rounded up and never negative.
    #[must_use]
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let Some(end) = self.end_date else {
            return 0;
        };
        let seconds = (end - now).num_seconds();
        if seconds <= 0 {
            0
        } else {
            (seconds + 86_399) / 86_400
        }
    }

    /// Renewal is due once the end date is reached.
    #[must_use]
    pub fn is_renewal_due(&self, now: DateTime<Utc>) -> bool {
        self.end_date.is_some_and(|end| end <= now)
    }

    /// Renewal is offered from 45 days before the end date. Records without an
    /// end date are always renewable.
    #[must_use]
    pub fn is_within_renewal_window(&self, now: DateTime<Utc>) -> bool {
        self.end_date.map_or(true, |end| now >= end - renewal_window())
    }

    /// Amount to display, backfilling a missing price from the catalog.
    #[must_use]
    pub fn display_amount(&self) -> i64 {
        if self.amount > 0 {
            self.amount
        } else {
            self.plan.price(self.is_first_year)
        }
    }

    /// Cancel the subscription. Ledger history is untouched.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidSubscriptionTransition` for records that
    /// are already cancelled or expired.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> crate::Result<()> {
        self.status = self.status.transition_to(SubscriptionStatus::Cancelled)?;
        self.auto_renew = false;
        if let Some(settings) = self.auto_renew_settings.as_mut() {
            settings.enabled = false;
            settings.mandate_status = MandateStatus::NotRequired;
            settings.next_debit_date = None;
            settings.updated_at = now;
        }
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Merge an auto-renew update into the stored settings.
    ///
    /// Mandate status becomes `pending` whenever auto-renew ends up enabled and
    /// the next debit date follows the term end.
    pub fn apply_auto_renew(
        &mut self,
        update: AutoRenewUpdate,
        updated_by: InitiatorProfile,
        now: DateTime<Utc>,
    ) {
        let mut settings = self.auto_renew_settings.take().unwrap_or(AutoRenewSettings {
            enabled: self.auto_renew,
            method: None,
            payment_method_id: None,
            payment_method_label: None,
            last_four: None,
            brand: None,
            mandate_status: MandateStatus::NotRequired,
            next_debit_date: None,
            updated_at: now,
            updated_by: None,
        });

        if let Some(enabled) = update.enabled {
            settings.enabled = enabled;
        }
        if update.method.is_some() {
            settings.method = update.method;
        }
        if update.payment_method_id.is_some() {
            settings.payment_method_id = update.payment_method_id;
        }
        if update.payment_method_label.is_some() {
            settings.payment_method_label = update.payment_method_label;
        }
        if update.last_four.is_some() {
            settings.last_four = update.last_four;
        }
        if update.brand.is_some() {
            settings.brand = update.brand;
        }

        settings.mandate_status = if settings.enabled {
            MandateStatus::Pending
        } else {
            MandateStatus::NotRequired
        };
        settings.next_debit_date = if settings.enabled { self.end_date } else { None };
        settings.updated_at = now;
        settings.updated_by = Some(updated_by);

        self.auto_renew = settings.enabled;
        self.auto_renew_settings = Some(settings);
        self.updated_at = now;
    }
}
