//! Stripe API types.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Stripe customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Stripe customer ID.
    pub id: String,
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Metadata attached to the customer.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Stripe `PaymentIntent` object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    /// Payment intent ID.
    pub id: String,
    /// Amount in the smallest currency unit.
    #[serde(default)]
    pub amount: i64,
    /// Currency (e.g., "inr").
    #[serde(default)]
    pub currency: String,
    /// Status (succeeded, processing, `requires_payment_method`, etc.).
    #[serde(default)]
    pub status: String,
    /// Client secret for confirming on the frontend.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Latest charge, either an ID or the expanded object.
    #[serde(default)]
    pub latest_charge: Option<serde_json::Value>,
    /// Last payment error, present on failed intents.
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
}

impl PaymentIntent {
    /// Receipt URL from an expanded `latest_charge`.
    #[must_use]
    pub fn receipt_url(&self) -> Option<String> {
        self.latest_charge
            .as_ref()?
            .get("receipt_url")?
            .as_str()
            .map(ToString::to_string)
    }
}

/// Failure details on a payment intent.
#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Decline or error code.
    #[serde(default)]
    pub code: Option<String>,
}

/// Stripe list response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    /// Data items.
    pub data: Vec<T>,
    /// Whether there are more items.
    #[serde(default)]
    pub has_more: bool,
}

/// Stripe webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "payment_intent.succeeded").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_url_from_expanded_charge() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_1",
            "amount": 99900,
            "currency": "inr",
            "status": "succeeded",
            "latest_charge": { "id": "ch_1", "receipt_url": "https://pay.stripe.com/receipts/1" }
        }))
        .unwrap();
        assert_eq!(
            intent.receipt_url().as_deref(),
            Some("https://pay.stripe.com/receipts/1")
        );
    }

    #[test]
    fn unexpanded_charge_has_no_receipt() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_1",
            "status": "processing",
            "latest_charge": "ch_1"
        }))
        .unwrap();
        assert!(intent.receipt_url().is_none());
    }
}
