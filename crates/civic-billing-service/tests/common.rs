//! Common test utilities for civic-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use civic_billing_core::UserId;
use civic_billing_service::crypto::sign_stripe_payload;
use civic_billing_service::processor::{
    to_minor_units, PaymentIntentRequest, PaymentProcessor, ProcessorError,
    ProcessorIntent, INTENT_SUCCEEDED,
};
use civic_billing_service::{create_router, AppState, ServiceConfig};
use civic_billing_store::RocksStore;

/// Webhook signing secret configured on every harness.
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Publishable key the fake processor reports.
pub const PUBLISHABLE_KEY: &str = "pk_test_fake";

// ============================================================================
// Fake Processor
// ============================================================================

/// Callback run while a payment intent is being created.
pub type IntentHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct FakeState {
    intents: HashMap<String, ProcessorIntent>,
    customers: HashMap<String, String>,
    cancelled: Vec<String>,
    next_id: u32,
    on_create_intent: Option<IntentHook>,
}

/// In-memory payment processor.
#[derive(Default)]
pub struct FakeProcessor {
    state: Mutex<FakeState>,
}

impl FakeProcessor {
    /// Mark an intent as captured.
    pub fn succeed(&self, intent_id: &str) {
        self.set_status(intent_id, INTENT_SUCCEEDED);
    }

    /// Set the status an intent reports.
    pub fn set_status(&self, intent_id: &str, status: &str) {
        let mut state = self.state.lock().unwrap();
        let intent = state.intents.get_mut(intent_id).expect("unknown intent");
        intent.status = status.to_string();
        if status == INTENT_SUCCEEDED {
            intent.receipt_url = Some(format!("https://receipts.test/{intent_id}"));
        }
    }

    /// Run `hook` once, during the next intent creation.
    pub fn on_next_intent(&self, hook: impl FnOnce() + Send + 'static) {
        self.state.lock().unwrap().on_create_intent = Some(Box::new(hook));
    }

    /// A created intent.
    pub fn intent(&self, intent_id: &str) -> ProcessorIntent {
        self.state.lock().unwrap().intents[intent_id].clone()
    }

    /// Number of customers created.
    pub fn customer_count(&self) -> usize {
        self.state.lock().unwrap().customers.len()
    }

    /// Processor subscriptions cancelled so far.
    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    fn publishable_key(&self) -> Option<&str> {
        Some(PUBLISHABLE_KEY)
    }

    async fn find_or_create_customer(
        &self,
        _user_id: &UserId,
        email: &str,
        _name: Option<&str>,
        existing: Option<&str>,
    ) -> Result<String, ProcessorError> {
        if let Some(existing) = existing {
            return Ok(existing.to_string());
        }
        let mut state = self.state.lock().unwrap();
        let next = state.customers.len() + 1;
        Ok(state
            .customers
            .entry(email.to_string())
            .or_insert_with(|| format!("cus_fake_{next}"))
            .clone())
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<ProcessorIntent, ProcessorError> {
        let hook = self.state.lock().unwrap().on_create_intent.take();
        if let Some(hook) = hook {
            hook();
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("pi_fake_{}", state.next_id);
        let intent = ProcessorIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            status: "requires_payment_method".into(),
            amount: request.amount,
            currency: request.currency.to_lowercase(),
            customer_id: request.customer_id.clone(),
            receipt_url: None,
            metadata: request.metadata.clone(),
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<ProcessorIntent, ProcessorError> {
        self.state
            .lock()
            .unwrap()
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| ProcessorError::NotFound(id.to_string()))
    }

    async fn cancel_subscription(&self, id: &str) -> Result<(), ProcessorError> {
        self.state.lock().unwrap().cancelled.push(id.to_string());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store access for setup and assertions.
    pub store: Arc<RocksStore>,
    /// The fake processor, when one is configured.
    pub processor: Option<Arc<FakeProcessor>>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// A harness with the fake processor and a webhook secret.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// A harness with no payment processor configured.
    pub fn without_processor() -> Self {
        Self::build(false)
    }

    fn build(with_processor: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_base_url: "http://localhost".into(),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            ..ServiceConfig::default()
        };

        let processor = with_processor.then(|| Arc::new(FakeProcessor::default()));
        let dyn_processor = processor
            .clone()
            .map(|p| p as Arc<dyn PaymentProcessor>);

        let state = AppState::with_processor(Arc::clone(&store), config, dyn_processor);
        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            processor,
            _temp_dir: temp_dir,
            test_user_id: UserId::generate(),
        }
    }

    /// The fake processor. Panics on a harness without one.
    pub fn fake(&self) -> &FakeProcessor {
        self.processor.as_deref().expect("harness has no processor")
    }

    /// Authorization header for the test user as a student with an email.
    pub fn user_auth_header(&self) -> String {
        student_auth(self.test_user_id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Student bearer token with an email.
pub fn student_auth(user_id: UserId) -> String {
    format!("Bearer test-token:{user_id}:student:{user_id}@example.com")
}

/// Parent bearer token with an email.
pub fn parent_auth(user_id: UserId) -> String {
    format!("Bearer test-token:{user_id}:parent:parent-{user_id}@example.com")
}

/// Student bearer token without an email.
pub fn auth_without_email(user_id: UserId) -> String {
    format!("Bearer test-token:{user_id}:student")
}

// ============================================================================
// Webhooks
// ============================================================================

/// `Stripe-Signature` header for a payload, signed now.
pub fn sign_webhook(payload: &str) -> String {
    sign_stripe_payload(payload, WEBHOOK_SECRET, Utc::now().timestamp()).unwrap()
}

/// A `payment_intent.*` event body for a fake intent.
pub fn intent_event(event_type: &str, intent: &ProcessorIntent) -> String {
    let metadata: BTreeMap<&str, &str> = intent
        .metadata
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    json!({
        "id": format!("evt_{}", intent.id),
        "type": event_type,
        "data": {
            "object": {
                "id": intent.id,
                "amount": to_minor_units(intent.amount),
                "currency": intent.currency,
                "status": intent.status,
                "customer": intent.customer_id,
                "metadata": metadata,
                "latest_charge": { "id": "ch_fake", "receipt_url": intent.receipt_url },
                "last_payment_error": if event_type == "payment_intent.payment_failed" {
                    json!({ "message": "Your card was declined.", "code": "card_declined" })
                } else {
                    serde_json::Value::Null
                }
            }
        }
    })
    .to_string()
}
