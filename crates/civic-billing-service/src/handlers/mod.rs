//! HTTP request handlers.

pub mod health;
pub mod realtime;
pub mod subscriptions;
pub mod webhooks;
