//! Plan catalog for civic-billing.
//!
//! The catalog is a fixed table. Every subscription snapshots the name, prices
//! and feature entitlements of its plan at creation time, so later catalog edits
//! never rewrite history.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::BillingError;

// ============================================================================
// Constants
// ============================================================================

/// Currency for every amount in the catalog and ledger.
pub const CURRENCY: &str = "INR";

/// Length of one paid or free term, in days.
pub const SUBSCRIPTION_TERM_DAYS: i64 = 365;

/// How long before the end date a subscription is considered renewable, in days.
pub const RENEWAL_WINDOW_DAYS: i64 = 45;

/// Maximum number of subscriptions returned by the history read model.
pub const HISTORY_LIMIT: usize = 10;

/// `games_per_pillar` value meaning "no limit".
pub const UNLIMITED_GAMES: i32 = -1;

/// Length of one term as a duration.
#[must_use]
pub fn subscription_term() -> Duration {
    Duration::days(SUBSCRIPTION_TERM_DAYS)
}

/// Length of the renewal window as a duration.
#[must_use]
pub fn renewal_window() -> Duration {
    Duration::days(RENEWAL_WINDOW_DAYS)
}

/// Catalog plan identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanId {
    /// Free tier with a limited game allowance.
    Free,

    /// Students Premium Plan.
    StudentPremium,

    /// Student + Parent Premium Pro Plan, includes the parent dashboard.
    StudentParentPremiumPro,

    /// Institution-provisioned plan, never sold through checkout.
    EducationalInstitutionsPremium,
}

impl PlanId {
    /// All catalog plans.
    pub const ALL: [Self; 4] = [
        Self::Free,
        Self::StudentPremium,
        Self::StudentParentPremiumPro,
        Self::EducationalInstitutionsPremium,
    ];

    /// Wire identifier of the plan.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::StudentPremium => "student_premium",
            Self::StudentParentPremiumPro => "student_parent_premium_pro",
            Self::EducationalInstitutionsPremium => "educational_institutions_premium",
        }
    }

    /// Catalog entry for this plan.
    #[must_use]
    pub fn config(&self) -> PlanConfig {
        match self {
            Self::Free => PlanConfig {
                name: "Free Plan",
                first_year_amount: 0,
                renewal_amount: 0,
                features: PlanFeatures::free(),
            },
            Self::StudentPremium => PlanConfig {
                name: "Students Premium Plan",
                first_year_amount: 4499,
                renewal_amount: 999,
                features: PlanFeatures::premium(false),
            },
            Self::StudentParentPremiumPro => PlanConfig {
                name: "Student + Parent Premium Pro Plan",
                first_year_amount: 4999,
                renewal_amount: 1499,
                features: PlanFeatures::premium(true),
            },
            Self::EducationalInstitutionsPremium => PlanConfig {
                name: "Educational Institutions Premium Plan",
                first_year_amount: 0,
                renewal_amount: 0,
                features: PlanFeatures::premium(true),
            },
        }
    }

    /// Price for a term of this plan.
    #[must_use]
    pub fn price(&self, is_first_year: bool) -> i64 {
        let config = self.config();
        if is_first_year {
            config.first_year_amount
        } else {
            config.renewal_amount
        }
    }

    /// Whether the plan costs nothing.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    /// Whether the plan is provisioned by institutions rather than sold.
    #[must_use]
    pub const fn is_institutional(&self) -> bool {
        matches!(self, Self::EducationalInstitutionsPremium)
    }

    /// Whether this is the plan parents are allowed to buy.
    #[must_use]
    pub const fn grants_parent_dashboard(&self) -> bool {
        matches!(
            self,
            Self::StudentParentPremiumPro | Self::EducationalInstitutionsPremium
        )
    }
}

impl FromStr for PlanId {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|plan| plan.as_str() == s)
            .ok_or_else(|| BillingError::InvalidPlan {
                plan: s.to_string(),
            })
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanConfig {
    /// Display name.
    pub name: &'static str,

    /// Price of the first year, in whole rupees.
    pub first_year_amount: i64,

    /// Price of each renewal year, in whole rupees.
    pub renewal_amount: i64,

    /// Entitlements granted by the plan.
    pub features: PlanFeatures,
}

/// Feature entitlements snapshotted onto each subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFeatures {
    /// Unlocks every game and module.
    pub full_access: bool,

    /// Parent dashboard access.
    pub parent_dashboard: bool,

    /// Advanced progress analytics.
    pub advanced_analytics: bool,

    /// Completion certificates.
    pub certificates: bool,

    /// Wise Club community access.
    pub wise_club_access: bool,

    /// Inavora presentation tool access.
    pub inavora_access: bool,

    /// Games per pillar, `-1` for unlimited.
    pub games_per_pillar: i32,

    /// Total number of games available.
    pub total_games: i32,
}

impl PlanFeatures {
    fn free() -> Self {
        Self {
            full_access: false,
            parent_dashboard: false,
            advanced_analytics: false,
            certificates: false,
            wise_club_access: false,
            inavora_access: false,
            games_per_pillar: 5,
            total_games: 50,
        }
    }

    fn premium(parent_dashboard: bool) -> Self {
        Self {
            full_access: true,
            parent_dashboard,
            advanced_analytics: true,
            certificates: true,
            wise_club_access: true,
            inavora_access: true,
            games_per_pillar: UNLIMITED_GAMES,
            total_games: 2200,
        }
    }
}
