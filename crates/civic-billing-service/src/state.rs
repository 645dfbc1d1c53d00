//! Application state.

use std::sync::Arc;

use civic_billing_store::RocksStore;

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::notify::Notifier;
use crate::processor::{PaymentProcessor, StripeProcessor};

/// Message shown when a paid checkout is attempted without a processor.
pub const GATEWAY_NOT_CONFIGURED: &str = "Payment gateway not configured. Please contact support.";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Payment processor for paid plans (optional).
    pub processor: Option<Arc<dyn PaymentProcessor>>,

    /// Per-user event rooms.
    pub notifier: Arc<Notifier>,
}

impl AppState {
    /// Create a new application state, building the Stripe processor from config.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let processor = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeProcessor::new(
                key,
                &config.stripe_api_base,
                config.stripe_publishable_key.clone(),
            ) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client) as Arc<dyn PaymentProcessor>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if processor.is_none() {
            tracing::warn!("Stripe not configured - paid plans will not be available");
        }

        Self::with_processor(store, config, processor)
    }

    /// Create application state with an explicit processor.
    #[must_use]
    pub fn with_processor(
        store: Arc<RocksStore>,
        config: ServiceConfig,
        processor: Option<Arc<dyn PaymentProcessor>>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(config.notify_channel_capacity));
        Self {
            store,
            config,
            processor,
            notifier,
        }
    }

    /// The configured processor, or the error shown to callers when there is none.
    pub fn require_processor(&self) -> Result<&Arc<dyn PaymentProcessor>, ApiError> {
        self.processor
            .as_ref()
            .ok_or_else(|| ApiError::NotConfigured(GATEWAY_NOT_CONFIGURED.into()))
    }

    /// Check if a payment processor is configured.
    #[must_use]
    pub fn has_processor(&self) -> bool {
        self.processor.is_some()
    }
}
