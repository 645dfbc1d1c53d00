//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Default Stripe API base URL.
pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/civic-billing").
    pub data_dir: String,

    /// JWT issuer base URL; JWKS is fetched from `/.well-known/jwks.json` under it.
    pub auth_base_url: String,

    /// Expected JWT audience (default: "civic-billing").
    pub auth_audience: String,

    /// Stripe secret API key (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook signing secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe publishable key returned to clients for checkout (optional).
    pub stripe_publishable_key: Option<String>,

    /// Stripe API base URL.
    pub stripe_api_base: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Buffered events per user notification room.
    pub notify_channel_capacity: usize,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
    #[serde(default)]
    publishable_key: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Try to load Stripe secrets from file first, then fall back to env vars
        let stripe = load_stripe_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/civic-billing".into()),
            auth_base_url: std::env::var("AUTH_BASE_URL")
                .unwrap_or_else(|_| "https://auth.civicgames.app".into()),
            auth_audience: std::env::var("AUTH_AUDIENCE")
                .unwrap_or_else(|_| "civic-billing".into()),
            stripe_api_key: stripe.api_key,
            stripe_webhook_secret: stripe.webhook_secret,
            stripe_publishable_key: stripe.publishable_key,
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_STRIPE_API_BASE.into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            notify_channel_capacity: std::env::var("NOTIFY_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(32),
        }
    }
}

/// Stripe credentials, from whichever source provided them.
#[derive(Debug, Default)]
struct StripeSettings {
    api_key: Option<String>,
    webhook_secret: Option<String>,
    publishable_key: Option<String>,
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> StripeSettings {
    let secret_paths = [
        ".secrets/stripe.json",
        "civic-billing/.secrets/stripe.json",
        "../.secrets/stripe.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return StripeSettings {
                api_key: Some(secrets.api_key),
                webhook_secret: secrets.webhook_secret,
                publishable_key: secrets.publishable_key,
            };
        }
    }

    // Fall back to environment variables
    tracing::debug!("Stripe secrets file not found, using environment variables");
    StripeSettings {
        api_key: std::env::var("STRIPE_API_KEY").ok(),
        webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
        publishable_key: std::env::var("STRIPE_PUBLISHABLE_KEY").ok(),
    }
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/civic-billing".into(),
            auth_base_url: "https://auth.civicgames.app".into(),
            auth_audience: "civic-billing".into(),
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_publishable_key: None,
            stripe_api_base: DEFAULT_STRIPE_API_BASE.into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            notify_channel_capacity: 32,
        }
    }
}
