//! Transactions ledger read model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::plan::PlanId;
use crate::subscription::{Attribution, Subscription, SubscriptionStatus};
use crate::transaction::{Transaction, TransactionMode};
use crate::SubscriptionId;

/// One ledger row: a transaction with the plan name of its subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// The transaction.
    #[serde(flatten)]
    pub transaction: Transaction,

    /// Plan name snapshotted on the owning subscription.
    pub plan_name: String,
}

/// Summary of the plan the user currently holds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePlanSummary {
    /// Subscription ID.
    pub subscription_id: SubscriptionId,
    /// Plan.
    #[serde(rename = "planType")]
    pub plan: PlanId,
    /// Plan name.
    pub plan_name: String,
    /// Status as stored.
    pub status: SubscriptionStatus,
    /// End of term.
    pub end_date: Option<DateTime<Utc>>,
    /// Confirmed renewals.
    pub renewal_count: u32,
    /// First purchaser.
    pub purchased_by: Option<Attribution>,
    /// Most recent renewer.
    pub last_renewed_by: Option<Attribution>,
}

/// Totals over a user's ledger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    /// Sum of completed amounts, in whole rupees.
    pub total_spend: i64,
    /// Number of entries of any status.
    pub total_transactions: usize,
    /// Number of completed renewals.
    pub total_renewals: usize,
    /// Latest completed payment date.
    pub last_payment_date: Option<DateTime<Utc>>,
    /// End date of the current subscription.
    pub next_renewal_date: Option<DateTime<Utc>>,
    /// The current subscription, if any.
    pub active_plan: Option<ActivePlanSummary>,
}

/// Ledger rows, newest first, with their summary.
#[derive(Debug, Clone, Serialize)]
pub struct Ledger {
    /// Rows sorted by payment date (or creation date) descending.
    pub transactions: Vec<LedgerEntry>,
    /// Totals.
    pub summary: LedgerSummary,
}

/// Build the ledger view over every subscription and transaction of one user.
#[must_use]
pub fn build_ledger(
    subscriptions: &[Subscription],
    transactions: Vec<Transaction>,
    now: DateTime<Utc>,
) -> Ledger {
    let plan_names: HashMap<SubscriptionId, &str> = subscriptions
        .iter()
        .map(|sub| (sub.id, sub.plan_name.as_str()))
        .collect();

    let mut total_spend = 0;
    let mut total_renewals = 0;
    let mut last_payment_date: Option<DateTime<Utc>> = None;

    for tx in transactions.iter().filter(|tx| tx.is_completed()) {
        total_spend += tx.amount;
        if tx.mode == TransactionMode::Renewal {
            total_renewals += 1;
        }
        if let Some(paid) = tx.payment_date {
            last_payment_date = Some(last_payment_date.map_or(paid, |last| last.max(paid)));
        }
    }

    let mut entries: Vec<LedgerEntry> = transactions
        .into_iter()
        .map(|transaction| {
            let plan_name = plan_names
                .get(&transaction.subscription_id)
                .map_or_else(|| transaction.plan.config().name.to_string(), ToString::to_string);
            LedgerEntry {
                transaction,
                plan_name,
            }
        })
        .collect();
    entries.sort_by_key(|entry| std::cmp::Reverse(entry.transaction.effective_date()));

    let active = subscriptions
        .iter()
        .filter(|sub| sub.is_current(now))
        .max_by_key(|sub| sub.created_at);

    Ledger {
        summary: LedgerSummary {
            total_spend,
            total_transactions: entries.len(),
            total_renewals,
            last_payment_date,
            next_renewal_date: active.and_then(|sub| sub.end_date),
            active_plan: active.map(|sub| ActivePlanSummary {
                subscription_id: sub.id,
                plan: sub.plan,
                plan_name: sub.plan_name.clone(),
                status: sub.status,
                end_date: sub.end_date,
                renewal_count: sub.renewal_count,
                purchased_by: sub.purchased_by.clone(),
                last_renewed_by: sub.last_renewed_by.clone(),
            }),
        },
        transactions: entries,
    }
}
