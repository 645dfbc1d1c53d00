//! civic-billing HTTP API service.
//!
//! This crate serves the subscription flow of the learning platform:
//!
//! - Plan checkout: free activation or a payment intent for paid plans
//! - Payment verification and Stripe webhook reconciliation
//! - Current subscription, history and transaction ledger views
//! - Auto-renew settings and cancellation
//! - Per-user real-time events over WebSocket
//!
//! # Authentication
//!
//! End-user requests carry a bearer JWT validated against the auth service's
//! JWKS. Webhooks are authenticated by their Stripe signature.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers must be async for axum

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod processor;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use notify::{EventKind, Notifier, SubscriptionEvent};
pub use processor::{PaymentProcessor, ProcessorError, ProcessorIntent, StripeProcessor};
pub use routes::create_router;
pub use state::AppState;
