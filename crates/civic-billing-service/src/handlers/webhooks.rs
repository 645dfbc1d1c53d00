//! Stripe webhook handler.
//!
//! Confirmed payments arriving here go through the same finalize as client
//! verification, so a webhook racing a verify call extends the term once.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use civic_billing_core::{ConfirmedPayment, FinalizeOutcome, UserId};
use civic_billing_store::Store;

use crate::crypto::verify_stripe_signature;
use crate::error::ApiError;
use crate::notify::EventKind;
use crate::processor::types::{PaymentIntent, WebhookEvent};
use crate::state::AppState;

/// Reason recorded when the processor gives none.
const DEFAULT_FAILURE_REASON: &str = "Payment failed";

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
}

/// Handle Stripe webhooks.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if !state.has_processor() {
        return Err(ApiError::NotConfigured(
            "Payment processor not configured".into(),
        ));
    }
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::NotConfigured("Webhook secret not configured".into()))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing signature".into()))?;

    verify_stripe_signature(&body, signature, secret, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!(error = %e, "Invalid Stripe webhook signature");
        ApiError::BadRequest("Invalid signature".into())
    })?;

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            handle_payment_succeeded(&state, event.data.object)?;
        }
        "payment_intent.payment_failed" => {
            handle_payment_failed(&state, event.data.object)?;
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

fn parse_intent(object: serde_json::Value) -> Option<PaymentIntent> {
    serde_json::from_value(object)
        .inspect_err(|e| tracing::warn!(error = %e, "Malformed payment intent in webhook"))
        .ok()
}

fn handle_payment_succeeded(state: &AppState, object: serde_json::Value) -> Result<(), ApiError> {
    let Some(intent) = parse_intent(object) else {
        return Ok(());
    };

    let Some(transaction) = state.store.find_transaction_by_payment_intent(&intent.id)? else {
        tracing::info!(payment_intent_id = %intent.id, "No transaction for payment intent - skipping");
        return Ok(());
    };

    let metadata_user = intent
        .metadata
        .get("user_id")
        .and_then(|id| id.parse::<UserId>().ok());
    if metadata_user != Some(transaction.user_id) {
        tracing::warn!(
            payment_intent_id = %intent.id,
            metadata_user_id = ?metadata_user,
            "Payment intent owner does not match transaction - skipping"
        );
        return Ok(());
    }

    let payment = ConfirmedPayment {
        payment_intent_id: intent.id.clone(),
        payment_status: intent.status.clone(),
        receipt_url: intent.receipt_url(),
    };

    match state.store.complete_payment(&payment, Utc::now())? {
        FinalizeOutcome::Updated { subscription, .. } => {
            tracing::info!(
                user_id = %subscription.user_id,
                subscription_id = %subscription.id,
                payment_intent_id = %intent.id,
                end_date = ?subscription.end_date,
                "Subscription activated from webhook"
            );
            state.notifier.publish(EventKind::Activated, &subscription);
        }
        FinalizeOutcome::AlreadyCompleted { subscription, .. } => {
            tracing::debug!(
                subscription_id = %subscription.id,
                payment_intent_id = %intent.id,
                "Payment already applied"
            );
        }
        FinalizeOutcome::NotMatched => {
            tracing::info!(payment_intent_id = %intent.id, "Payment intent not matched");
        }
    }

    Ok(())
}

fn handle_payment_failed(state: &AppState, object: serde_json::Value) -> Result<(), ApiError> {
    let Some(intent) = parse_intent(object) else {
        return Ok(());
    };

    let reason = intent
        .last_payment_error
        .as_ref()
        .and_then(|e| e.message.as_deref())
        .unwrap_or(DEFAULT_FAILURE_REASON);

    match state.store.fail_payment(&intent.id, reason)? {
        Some(transaction) => {
            tracing::warn!(
                payment_intent_id = %intent.id,
                transaction_id = %transaction.id,
                status = ?transaction.status,
                reason = %reason,
                "Payment failed"
            );
        }
        None => {
            tracing::info!(payment_intent_id = %intent.id, "No transaction for failed payment intent - skipping");
        }
    }

    Ok(())
}
