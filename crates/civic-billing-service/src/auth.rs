//! Authentication extractor.
//!
//! Requests carry a bearer JWT issued by the platform's auth service. Tokens
//! are RS256-signed; keys come from the issuer's JWKS document and are cached
//! for an hour. WebSocket clients that cannot set headers may pass the same
//! token as a `token` query parameter.
//!
//! Test builds and builds with the `test-auth` feature also accept
//! `test-token:<uuid>[:<role>[:<email>]]`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use civic_billing_core::{Requester, UserId, UserRole};

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Constants
// ============================================================================

/// How long to cache JWKS keys before refreshing.
const JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600);

/// Timeout for JWKS fetch requests.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix of test bearer tokens.
#[cfg(any(test, feature = "test-auth"))]
const TEST_TOKEN_PREFIX: &str = "test-token:";

/// An authenticated platform user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
    /// Platform role.
    pub role: UserRole,
    /// Display name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
}

impl AuthUser {
    /// The user as a checkout requester.
    #[must_use]
    pub fn requester(&self) -> Requester {
        Requester {
            user_id: self.user_id,
            role: self.role,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;

        // Never compiled into production builds.
        #[cfg(any(test, feature = "test-auth"))]
        if let Some(rest) = token.strip_prefix(TEST_TOKEN_PREFIX) {
            return parse_test_token(rest).ok_or(ApiError::Unauthorized);
        }

        let claims = validate_jwt(&token, state).await?;
        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(Self {
            user_id,
            role: claims.role.as_deref().map_or(UserRole::Student, parse_role),
            name: claims.name,
            email: claims.email,
        })
    }
}

/// Bearer token from the `Authorization` header, else the `token` query parameter.
fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    {
        return header.strip_prefix("Bearer ").map(ToString::to_string);
    }

    parts.uri.query()?.split('&').find_map(|pair| {
        pair.strip_prefix("token=")
            .filter(|t| !t.is_empty())
            .map(|t| t.replace("%3A", ":").replace("%3a", ":"))
    })
}

/// Parse `<uuid>[:<role>[:<email>]]`.
#[cfg(any(test, feature = "test-auth"))]
fn parse_test_token(rest: &str) -> Option<AuthUser> {
    let mut parts = rest.splitn(3, ':');
    let user_id = parts.next()?.parse::<UserId>().ok()?;
    let role = parts.next().map_or(UserRole::Student, parse_role);
    let email = parts
        .next()
        .filter(|e| !e.is_empty())
        .map(ToString::to_string);

    Some(AuthUser {
        user_id,
        role,
        name: Some("Test User".into()),
        email,
    })
}

fn parse_role(role: &str) -> UserRole {
    role.parse().unwrap_or(UserRole::Other)
}

/// JWT claims issued by the platform auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Audience (can be string or array).
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Issuer.
    pub iss: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    pub iat: i64,
    /// Platform role, e.g. `student` or `parent`.
    #[serde(default)]
    pub role: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
}

// ============================================================================
// JWKS Client and JWT Validation
// ============================================================================

/// JWKS (JSON Web Key Set) response structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    /// List of JWK keys.
    pub keys: Vec<Jwk>,
}

/// Single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA").
    pub kty: String,
    /// Key ID.
    pub kid: Option<String>,
    /// RSA public key modulus (base64url encoded).
    pub n: Option<String>,
    /// RSA public key exponent (base64url encoded).
    pub e: Option<String>,
}

struct JwksCache {
    client: reqwest::Client,
    keys: HashMap<String, DecodingKey>,
    /// Key for tokens without `kid`.
    default_key: Option<DecodingKey>,
    last_updated: Option<Instant>,
}

impl JwksCache {
    fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            keys: HashMap::new(),
            default_key: None,
            last_updated: None,
        }
    }

    fn is_fresh(&self) -> bool {
        self.last_updated
            .is_some_and(|at| at.elapsed() < JWKS_CACHE_DURATION)
    }

    fn lookup(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self.keys.get(kid).cloned(),
            None => self.default_key.clone(),
        }
    }

    fn replace(&mut self, jwks: &Jwks) {
        self.keys.clear();
        self.default_key = None;
        self.last_updated = Some(Instant::now());

        for jwk in &jwks.keys {
            let Some(key) = jwk_to_decoding_key(jwk) else {
                continue;
            };
            if let Some(kid) = &jwk.kid {
                self.keys.insert(kid.clone(), key.clone());
            }
            if self.default_key.is_none() {
                self.default_key = Some(key);
            }
        }
    }
}

static JWKS_CACHE: std::sync::OnceLock<RwLock<JwksCache>> = std::sync::OnceLock::new();

fn jwks_cache() -> &'static RwLock<JwksCache> {
    JWKS_CACHE.get_or_init(|| RwLock::new(JwksCache::new()))
}

async fn validate_jwt(token: &str, state: &AppState) -> Result<JwtClaims, ApiError> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "Failed to decode JWT header");
        ApiError::Unauthorized
    })?;

    let key = decoding_key(header.kid.as_deref(), state).await?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[&state.config.auth_audience]);
    validation.set_issuer(&[&state.config.auth_base_url]);

    decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            ApiError::Unauthorized
        })
}

async fn decoding_key(kid: Option<&str>, state: &AppState) -> Result<DecodingKey, ApiError> {
    let cache = jwks_cache();

    {
        let cached = cache.read().await;
        if cached.is_fresh() {
            if let Some(key) = cached.lookup(kid) {
                return Ok(key);
            }
        }
    }

    let jwks = fetch_jwks(state).await?;
    let mut cached = cache.write().await;
    cached.replace(&jwks);
    cached.lookup(kid).ok_or(ApiError::Unauthorized)
}

async fn fetch_jwks(state: &AppState) -> Result<Jwks, ApiError> {
    let url = format!(
        "{}/.well-known/jwks.json",
        state.config.auth_base_url.trim_end_matches('/')
    );
    tracing::debug!(url = %url, "Fetching JWKS");

    let client = jwks_cache().read().await.client.clone();
    let unavailable = || ApiError::ExternalService("Failed to fetch authentication keys".into());

    let response = client.get(&url).send().await.map_err(|e| {
        tracing::error!(error = %e, url = %url, "Failed to fetch JWKS");
        unavailable()
    })?;

    if !response.status().is_success() {
        tracing::error!(status = %response.status(), url = %url, "JWKS fetch returned non-success status");
        return Err(unavailable());
    }

    let jwks: Jwks = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse JWKS response");
        unavailable()
    })?;

    tracing::info!(keys_count = jwks.keys.len(), "JWKS fetched");
    Ok(jwks)
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        tracing::debug!(kty = %jwk.kty, "Skipping non-RSA JWK");
        return None;
    }
    DecodingKey::from_rsa_components(jwk.n.as_ref()?, jwk.e.as_ref()?).ok()
}
