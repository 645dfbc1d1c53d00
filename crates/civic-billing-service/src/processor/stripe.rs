//! Stripe API client implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use civic_billing_core::UserId;

use super::types::{Customer, PaymentIntent, StripeErrorResponse, StripeList};
use super::{
    from_minor_units, to_minor_units, PaymentIntentRequest, PaymentProcessor, ProcessorError,
    ProcessorIntent,
};

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeProcessor {
    client: Client,
    api_key: String,
    base_url: String,
    publishable_key: Option<String>,
}

impl StripeProcessor {
    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `base_url` - API base, normally `https://api.stripe.com/v1`
    /// * `publishable_key` - Optional key handed to clients for checkout
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        publishable_key: Option<String>,
    ) -> Result<Self, ProcessorError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            publishable_key,
        })
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, ProcessorError> {
        let response = self
            .client
            .get(format!("{}/customers", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await?;

        let list: StripeList<Customer> = Self::handle_response(response).await?;
        Ok(list.data.into_iter().next())
    }

    async fn create_customer(
        &self,
        user_id: &UserId,
        email: &str,
        name: Option<&str>,
    ) -> Result<Customer, ProcessorError> {
        let mut params = vec![
            ("email", email.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/customers", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProcessorError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) if status == reqwest::StatusCode::NOT_FOUND => {
                Err(ProcessorError::NotFound(stripe_error.error.message))
            }
            Ok(stripe_error) => Err(ProcessorError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(ProcessorError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

impl From<PaymentIntent> for ProcessorIntent {
    fn from(intent: PaymentIntent) -> Self {
        let receipt_url = intent.receipt_url();
        Self {
            id: intent.id,
            client_secret: intent.client_secret,
            status: intent.status,
            amount: from_minor_units(intent.amount),
            currency: intent.currency,
            customer_id: intent.customer,
            receipt_url,
            metadata: intent.metadata,
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    fn publishable_key(&self) -> Option<&str> {
        self.publishable_key.as_deref()
    }

    async fn find_or_create_customer(
        &self,
        user_id: &UserId,
        email: &str,
        name: Option<&str>,
        existing: Option<&str>,
    ) -> Result<String, ProcessorError> {
        if let Some(id) = existing {
            return Ok(id.to_string());
        }

        if let Some(customer) = self.find_customer_by_email(email).await? {
            tracing::debug!(user_id = %user_id, customer_id = %customer.id, "Reusing Stripe customer");
            return Ok(customer.id);
        }

        let customer = self.create_customer(user_id, email, name).await?;
        tracing::info!(user_id = %user_id, customer_id = %customer.id, "Created Stripe customer");
        Ok(customer.id)
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<ProcessorIntent, ProcessorError> {
        let mut params = vec![
            ("amount".to_string(), to_minor_units(request.amount).to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("description".to_string(), request.description.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(customer) = &request.customer_id {
            params.push(("customer".to_string(), customer.clone()));
        }
        if let Some(email) = &request.receipt_email {
            params.push(("receipt_email".to_string(), email.clone()));
        }
        for (key, value) in &request.metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        tracing::debug!(
            amount = %request.amount,
            currency = %request.currency,
            customer = ?request.customer_id,
            "Creating Stripe payment intent"
        );

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        let intent: PaymentIntent = Self::handle_response(response).await?;
        Ok(intent.into())
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<ProcessorIntent, ProcessorError> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{id}", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .query(&[("expand[]", "latest_charge")])
            .send()
            .await?;

        let intent: PaymentIntent = Self::handle_response(response).await?;
        Ok(intent.into())
    }

    async fn cancel_subscription(&self, id: &str) -> Result<(), ProcessorError> {
        let response = self
            .client
            .delete(format!("{}/subscriptions/{id}", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        let _: serde_json::Value = Self::handle_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn processor(server: &MockServer) -> StripeProcessor {
        StripeProcessor::new("sk_test_xxx", server.uri(), Some("pk_test_xxx".into())).unwrap()
    }

    #[test]
    fn client_creation_trims_base() {
        let client = StripeProcessor::new("sk_test_xxx", "http://localhost/v1/", None).unwrap();
        assert_eq!(client.base_url, "http://localhost/v1");
        assert!(client.publishable_key().is_none());
    }

    #[tokio::test]
    async fn payment_intent_amount_is_sent_in_paise() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .and(body_string_contains("amount=449900"))
            .and(body_string_contains("currency=inr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_123",
                "amount": 449_900,
                "currency": "inr",
                "status": "requires_payment_method",
                "client_secret": "pi_123_secret_abc",
                "metadata": { "plan_type": "student_premium" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut metadata = BTreeMap::new();
        metadata.insert("plan_type".to_string(), "student_premium".to_string());
        let intent = processor(&server)
            .create_payment_intent(&PaymentIntentRequest {
                amount: 4499,
                currency: "INR".into(),
                customer_id: Some("cus_1".into()),
                receipt_email: Some("a@example.com".into()),
                description: "Subscription: Students Premium Plan".into(),
                metadata,
            })
            .await
            .unwrap();

        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.amount, 4499);
        assert_eq!(intent.client_secret.as_deref(), Some("pi_123_secret_abc"));
        assert!(!intent.is_succeeded());
    }

    #[tokio::test]
    async fn existing_customer_is_reused_by_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .and(query_param("email", "a@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [{ "id": "cus_existing", "email": "a@example.com" }],
                "has_more": false
            })))
            .mount(&server)
            .await;

        let id = processor(&server)
            .find_or_create_customer(&UserId::generate(), "a@example.com", None, None)
            .await
            .unwrap();
        assert_eq!(id, "cus_existing");
    }

    #[tokio::test]
    async fn missing_customer_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [],
                "has_more": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/customers"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "cus_new", "email": "b@example.com" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = processor(&server)
            .find_or_create_customer(&UserId::generate(), "b@example.com", Some("Bala"), None)
            .await
            .unwrap();
        assert_eq!(id, "cus_new");
    }

    #[tokio::test]
    async fn cached_customer_skips_api() {
        let server = MockServer::start().await;
        let id = processor(&server)
            .find_or_create_customer(&UserId::generate(), "c@example.com", None, Some("cus_cached"))
            .await
            .unwrap();
        assert_eq!(id, "cus_cached");
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn retrieve_reads_receipt_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payment_intents/pi_9"))
            .and(query_param("expand[]", "latest_charge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_9",
                "amount": 99_900,
                "currency": "inr",
                "status": "succeeded",
                "latest_charge": { "id": "ch_9", "receipt_url": "https://pay.stripe.com/r/9" }
            })))
            .mount(&server)
            .await;

        let intent = processor(&server).retrieve_payment_intent("pi_9").await.unwrap();
        assert!(intent.is_succeeded());
        assert_eq!(intent.amount, 999);
        assert_eq!(intent.receipt_url.as_deref(), Some("https://pay.stripe.com/r/9"));
    }

    #[tokio::test]
    async fn api_errors_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payment_intents/pi_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "type": "invalid_request_error", "message": "No such payment_intent" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/subscriptions/sub_1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "type": "invalid_request_error", "message": "already canceled", "code": "resource_missing" }
            })))
            .mount(&server)
            .await;

        let client = processor(&server);
        assert!(matches!(
            client.retrieve_payment_intent("pi_missing").await,
            Err(ProcessorError::NotFound(_))
        ));
        assert!(matches!(
            client.cancel_subscription("sub_1").await,
            Err(ProcessorError::Api { code: Some(ref c), .. }) if c == "resource_missing"
        ));
    }
}
