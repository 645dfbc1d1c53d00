//! Subscription checkout, verification and account handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use civic_billing_core::{
    build_ledger, resolve_purchase, AutoRenewUpdate, BillingError, ConfirmedPayment,
    FinalizeOutcome, InitiatorProfile, Ledger, PurchaseContext, PurchaseHistory, PurchaseQuote,
    PurchaseRequest, Subscription, SubscriptionId, Transaction, CURRENCY, HISTORY_LIMIT,
};
use civic_billing_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::notify::EventKind;
use crate::processor::PaymentIntentRequest;
use crate::state::AppState;

const NO_ACTIVE_SUBSCRIPTION: &str = "No active subscription found";

// ============================================================================
// Checkout
// ============================================================================

/// Checkout request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Plan identifier, e.g. `student_premium`.
    pub plan_type: String,
    /// `purchase` or `renew`.
    #[serde(default)]
    pub mode: Option<String>,
    /// `student`, `parent`, `admin` or `system`.
    #[serde(default)]
    pub context: Option<String>,
}

/// Checkout response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreatePaymentResponse {
    /// A free plan was activated immediately.
    Activated(ActivatedResponse),
    /// A payment intent awaits client confirmation.
    PaymentRequired(PaymentRequiredResponse),
}

/// Free activation result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedResponse {
    /// Always `false`.
    pub requires_payment: bool,
    /// Human-readable result.
    pub message: String,
    /// The active subscription.
    pub subscription: Subscription,
}

/// Details the client needs to confirm a payment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    /// Always `true`.
    pub requires_payment: bool,
    /// Subscription the payment applies to.
    pub subscription_id: SubscriptionId,
    /// Processor payment intent.
    pub payment_intent_id: String,
    /// Secret for the processor's client SDK.
    pub client_secret: Option<String>,
    /// Publishable processor key.
    pub key_id: Option<String>,
    /// Amount in whole rupees.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// `purchase` or `renewal`.
    pub mode: String,
    /// Whether first-year pricing applied.
    pub is_first_year: bool,
}

/// Start a checkout: activate a free plan or create a payment intent.
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, ApiError> {
    let now = Utc::now();
    let subscriptions = state.store.list_subscriptions_by_user(&auth.user_id, None)?;
    let transactions = state.store.list_transactions_by_user(&auth.user_id)?;

    let request = PurchaseRequest {
        plan: body.plan_type,
        mode: body.mode,
        context: body.context,
    };
    let quote = resolve_purchase(
        &request,
        &auth.requester(),
        PurchaseHistory {
            subscriptions: &subscriptions,
            transactions: &transactions,
        },
        now,
    )
    .inspect_err(|e| {
        tracing::debug!(user_id = %auth.user_id, plan = %request.plan, error = %e, "Checkout rejected");
    })?;

    if quote.is_free() {
        let subscription = activate_free(&state, quote)?;
        return Ok(Json(CreatePaymentResponse::Activated(ActivatedResponse {
            requires_payment: false,
            message: "Free plan activated successfully".into(),
            subscription,
        })));
    }

    let processor = state.require_processor()?;
    let email = auth
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Email is required for payment".into()))?;

    let cached_customer = subscriptions
        .iter()
        .find_map(|sub| sub.processor_customer_id.as_deref());
    let customer_id = processor
        .find_or_create_customer(&auth.user_id, email, auth.name.as_deref(), cached_customer)
        .await?;

    let (subscription_id, new_subscription) = match quote.renew_in_place {
        Some(id) => (id, None),
        None => {
            let subscription =
                Subscription::pending(auth.user_id, quote.plan, quote.is_first_year, now);
            (subscription.id, Some(subscription))
        }
    };

    let intent = processor
        .create_payment_intent(&PaymentIntentRequest {
            amount: quote.amount,
            currency: CURRENCY.to_string(),
            customer_id: Some(customer_id.clone()),
            receipt_email: Some(email.to_string()),
            description: format!("Subscription: {}", quote.plan.config().name),
            metadata: intent_metadata(&quote, &auth, &subscription_id),
        })
        .await?;

    let transaction = Transaction::pending_payment(
        subscription_id,
        auth.user_id,
        quote.plan,
        quote.amount,
        quote.mode,
        quote.initiator.clone(),
        intent.id.clone(),
        now,
    );

    // Renewals re-read the stored record under the store lock.
    let subscription = match new_subscription {
        Some(mut subscription) => {
            subscription.processor_customer_id = Some(customer_id);
            state.store.create_subscription(&subscription, &transaction)?;
            subscription
        }
        None => state
            .store
            .append_transaction(&transaction, Some(&customer_id), now)?,
    };

    tracing::info!(
        user_id = %auth.user_id,
        subscription_id = %subscription.id,
        plan = %quote.plan,
        amount = quote.amount,
        mode = quote.mode.as_str(),
        payment_intent_id = %intent.id,
        "Payment intent created"
    );

    Ok(Json(CreatePaymentResponse::PaymentRequired(
        PaymentRequiredResponse {
            requires_payment: true,
            subscription_id: subscription.id,
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            key_id: processor.publishable_key().map(ToString::to_string),
            amount: quote.amount,
            currency: CURRENCY.to_string(),
            mode: quote.mode.as_str().to_string(),
            is_first_year: quote.is_first_year,
        },
    )))
}

fn activate_free(state: &AppState, quote: PurchaseQuote) -> Result<Subscription, ApiError> {
    let now = Utc::now();
    let subscription = Subscription::activated_free(quote.initiator.clone(), now);
    let transaction = Transaction::system_grant(subscription.id, quote.plan, quote.initiator, now);
    state.store.create_subscription(&subscription, &transaction)?;

    tracing::info!(
        user_id = %subscription.user_id,
        subscription_id = %subscription.id,
        "Free plan activated"
    );
    state.notifier.publish(EventKind::Activated, &subscription);
    Ok(subscription)
}

fn intent_metadata(
    quote: &PurchaseQuote,
    auth: &AuthUser,
    subscription_id: &SubscriptionId,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("user_id".to_string(), auth.user_id.to_string()),
        ("plan_type".to_string(), quote.plan.to_string()),
        ("is_first_year".to_string(), quote.is_first_year.to_string()),
        ("mode".to_string(), quote.mode.as_str().to_string()),
        ("context".to_string(), quote.context.as_str().to_string()),
        ("initiated_by_role".to_string(), auth.role.as_str().to_string()),
        ("subscription_id".to_string(), subscription_id.to_string()),
    ])
}

// ============================================================================
// Verification
// ============================================================================

/// Client-side payment confirmation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    /// Subscription the payment was created for.
    #[serde(default)]
    pub subscription_id: String,
    /// Processor payment intent.
    #[serde(default)]
    pub payment_intent_id: String,
}

/// Result of applying a payment to a subscription.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMessageResponse {
    /// Human-readable result.
    pub message: String,
    /// The subscription after the change.
    pub subscription: Subscription,
}

/// Verify a payment the client confirmed and activate the subscription.
///
/// Repeating the call after success returns the subscription unchanged.
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VerifyPaymentRequest>,
) -> Result<Json<SubscriptionMessageResponse>, ApiError> {
    if body.subscription_id.is_empty() || body.payment_intent_id.is_empty() {
        return Err(ApiError::BadRequest(
            "Subscription ID and payment intent ID are required".into(),
        ));
    }

    let subscription_id: SubscriptionId = body
        .subscription_id
        .parse()
        .map_err(BillingError::from)?;
    let subscription = state
        .store
        .get_subscription(&subscription_id)?
        .filter(|sub| sub.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound("Subscription not found".into()))?;

    let processor = state.require_processor()?;
    let intent = processor
        .retrieve_payment_intent(&body.payment_intent_id)
        .await?;
    if !intent.is_succeeded() {
        return Err(ApiError::BadRequest(format!("Payment {}", intent.status)));
    }

    state
        .store
        .find_transaction_by_payment_intent(&intent.id)?
        .filter(|tx| tx.subscription_id == subscription.id)
        .ok_or_else(|| {
            ApiError::NotFound("Matching transaction not found for this payment".into())
        })?;

    let payment = ConfirmedPayment {
        payment_intent_id: intent.id.clone(),
        payment_status: intent.status.clone(),
        receipt_url: intent.receipt_url.clone(),
    };

    match state.store.complete_payment(&payment, Utc::now())? {
        FinalizeOutcome::Updated { subscription, .. } => {
            tracing::info!(
                user_id = %auth.user_id,
                subscription_id = %subscription.id,
                payment_intent_id = %intent.id,
                end_date = ?subscription.end_date,
                "Payment verified"
            );
            state.notifier.publish(EventKind::Activated, &subscription);
            Ok(Json(SubscriptionMessageResponse {
                message: "Subscription activated successfully".into(),
                subscription,
            }))
        }
        FinalizeOutcome::AlreadyCompleted { subscription, .. } => {
            tracing::debug!(
                subscription_id = %subscription.id,
                payment_intent_id = %intent.id,
                "Payment already applied"
            );
            Ok(Json(SubscriptionMessageResponse {
                message: "Subscription already active".into(),
                subscription,
            }))
        }
        FinalizeOutcome::NotMatched => Err(ApiError::Internal(format!(
            "Unable to finalize subscription payment {}",
            intent.id
        ))),
    }
}

// ============================================================================
// Read Models
// ============================================================================

/// The current subscription with computed fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSubscription {
    /// The subscription record.
    #[serde(flatten)]
    pub subscription: Subscription,
    /// Whole days left, `None` for the implicit free plan.
    pub days_remaining: Option<i64>,
    /// Newest ledger entry.
    pub latest_transaction: Option<Transaction>,
    /// The end date has been reached.
    pub is_renewal_due: bool,
    /// Renewal is offered.
    pub is_within_renewal_window: bool,
    /// This is the implicit free plan, not a stored record.
    pub is_default: bool,
}

/// Current subscription response.
#[derive(Debug, Serialize)]
pub struct CurrentSubscriptionResponse {
    /// The current subscription.
    pub subscription: CurrentSubscription,
}

/// Get the user's current subscription, or the implicit free plan.
pub async fn current(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CurrentSubscriptionResponse>, ApiError> {
    let now = Utc::now();

    let Some(subscription) = state.store.find_active_subscription(&auth.user_id, now)? else {
        let subscription = Subscription::synthesized_free(auth.user_id, now);
        return Ok(Json(CurrentSubscriptionResponse {
            subscription: CurrentSubscription {
                is_renewal_due: subscription.is_renewal_due(now),
                is_within_renewal_window: subscription.is_within_renewal_window(now),
                subscription,
                days_remaining: None,
                latest_transaction: None,
                is_default: true,
            },
        }));
    };

    let latest_transaction = state
        .store
        .list_transactions_by_subscription(&subscription.id)?
        .pop();

    Ok(Json(CurrentSubscriptionResponse {
        subscription: CurrentSubscription {
            days_remaining: Some(subscription.days_remaining(now)),
            is_renewal_due: subscription.is_renewal_due(now),
            is_within_renewal_window: subscription.is_within_renewal_window(now),
            latest_transaction,
            subscription,
            is_default: false,
        },
    }))
}

/// History response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Newest first.
    pub subscriptions: Vec<Subscription>,
}

/// The user's most recent subscriptions.
pub async fn history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<HistoryResponse>, ApiError> {
    let now = Utc::now();
    let subscriptions = state
        .store
        .list_subscriptions_by_user(&auth.user_id, Some(HISTORY_LIMIT))?
        .into_iter()
        .map(|mut sub| {
            sub.amount = sub.display_amount();
            if sub.plan_name.is_empty() {
                sub.plan_name = sub.plan.config().name.to_string();
            }
            sub.status = sub.effective_status(now);
            sub
        })
        .collect();

    Ok(Json(HistoryResponse { subscriptions }))
}

/// Every transaction the user has made, with summary figures.
pub async fn transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Ledger>, ApiError> {
    let subscriptions = state.store.list_subscriptions_by_user(&auth.user_id, None)?;
    let mut transactions = Vec::new();
    for sub in &subscriptions {
        transactions.extend(state.store.list_transactions_by_subscription(&sub.id)?);
    }

    Ok(Json(build_ledger(&subscriptions, transactions, Utc::now())))
}

// ============================================================================
// Settings
// ============================================================================

/// Auto-renew update. Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRenewRequest {
    /// Turn auto-renew on or off.
    pub enabled: Option<bool>,
    /// Payment method kind, e.g. `card` or `upi`.
    pub method: Option<String>,
    /// Processor payment method reference.
    pub payment_method_id: Option<String>,
    /// Display label.
    pub payment_method_label: Option<String>,
    /// Last four card digits.
    pub last_four: Option<String>,
    /// Card brand.
    pub brand: Option<String>,
}

/// Update auto-renew settings on the active subscription.
pub async fn update_auto_renew(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AutoRenewRequest>,
) -> Result<Json<SubscriptionMessageResponse>, ApiError> {
    if body.enabled.is_none() && body.method.is_none() && body.payment_method_id.is_none() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }

    let now = Utc::now();
    let active = state
        .store
        .find_active_subscription(&auth.user_id, now)?
        .ok_or_else(|| ApiError::NotFound(NO_ACTIVE_SUBSCRIPTION.into()))?;

    let updated_by = InitiatorProfile::new(
        auth.user_id,
        auth.role,
        auth.name.as_deref(),
        auth.email.as_deref(),
        PurchaseContext::normalize(None, auth.role),
    );
    let subscription = state.store.update_subscription(&active.id, |subscription| {
        let has_method = subscription
            .auto_renew_settings
            .as_ref()
            .is_some_and(|s| s.method.is_some());
        let update = AutoRenewUpdate {
            enabled: body.enabled,
            method: body
                .method
                .or_else(|| (!has_method).then(|| "card".to_string())),
            payment_method_id: body.payment_method_id,
            payment_method_label: body.payment_method_label,
            last_four: body.last_four,
            brand: body.brand,
        };
        subscription.apply_auto_renew(update, updated_by, now);
        Ok(())
    })?;

    tracing::info!(
        user_id = %auth.user_id,
        subscription_id = %subscription.id,
        enabled = subscription.auto_renew,
        "Auto-renew updated"
    );
    state
        .notifier
        .publish(EventKind::AutoRenewUpdated, &subscription);

    let message = if subscription.auto_renew {
        "Auto-renew enabled successfully"
    } else {
        "Auto-renew disabled successfully"
    };
    Ok(Json(SubscriptionMessageResponse {
        message: message.into(),
        subscription,
    }))
}

/// Cancel the active subscription.
///
/// A mirrored processor subscription is cancelled on a best-effort basis.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<SubscriptionMessageResponse>, ApiError> {
    let now = Utc::now();
    let active = state
        .store
        .find_active_subscription(&auth.user_id, now)?
        .ok_or_else(|| ApiError::NotFound(NO_ACTIVE_SUBSCRIPTION.into()))?;

    let subscription = state
        .store
        .update_subscription(&active.id, |subscription| Ok(subscription.cancel(now)?))?;

    if let (Some(remote_id), Some(processor)) =
        (subscription.processor_subscription_id.as_deref(), &state.processor)
    {
        if let Err(e) = processor.cancel_subscription(remote_id).await {
            tracing::warn!(
                subscription_id = %subscription.id,
                processor_subscription_id = %remote_id,
                error = %e,
                "Failed to cancel processor subscription - continuing"
            );
        }
    }

    tracing::info!(
        user_id = %auth.user_id,
        subscription_id = %subscription.id,
        "Subscription cancelled"
    );
    state.notifier.publish(EventKind::Cancelled, &subscription);

    Ok(Json(SubscriptionMessageResponse {
        message: "Subscription cancelled successfully".into(),
        subscription,
    }))
}
