//! Cryptographic utilities for webhook verification.
//!
//! Stripe signs each webhook delivery with the endpoint secret. The
//! `Stripe-Signature` header carries a timestamp and one or more `v1`
//! signatures: `t=1700000000,v1=<hex>,v1=<hex>`. The signed payload is
//! `"{t}.{raw body}"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Reasons a webhook signature is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The header has no `t=` element.
    #[error("missing timestamp")]
    MissingTimestamp,

    /// The header has no `v1=` element.
    #[error("missing v1 signature")]
    MissingSignature,

    /// No signature matched.
    #[error("signature mismatch")]
    Mismatch,

    /// The timestamp is outside the tolerance window.
    #[error("timestamp outside tolerance")]
    Expired,

    /// The secret could not be used as an HMAC key.
    #[error("invalid signing key")]
    InvalidKey,
}

/// Compute HMAC-SHA256 and return hex-encoded result.
///
/// # Errors
///
/// Returns `SignatureError::InvalidKey` if the HMAC implementation rejects the key.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// `now` is the current Unix time in seconds.
///
/// # Errors
///
/// Returns a `SignatureError` describing why the header was rejected.
pub fn verify_stripe_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(ts)) => timestamp = Some(ts),
            (Some("v1"), Some(sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"))?;
    if !signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        return Err(SignatureError::Mismatch);
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MissingTimestamp)?;
    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    Ok(())
}

/// Build a `Stripe-Signature` header value for a payload.
///
/// # Errors
///
/// Returns `SignatureError::InvalidKey` if the secret cannot be used.
pub fn sign_stripe_payload(
    payload: &str,
    secret: &str,
    timestamp: i64,
) -> Result<String, SignatureError> {
    let signature = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"))?;
    Ok(format!("t={timestamp},v1={signature}"))
}
