//! Webhook signature verification.
//!
//! The provider signs every webhook delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"` and sends the result in a header of the form
//!
//! ```text
//! Stripe-Signature: t=1700000000,v1=5257a869e7...,v1=...
//! ```
//!
//! Several `v1` entries may be present while the secret is being rolled;
//! any one of them matching is enough.

use ring::hmac;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Errors produced by signature verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Header missing a timestamp or a `v1` entry.
    #[error("invalid signature header format")]
    InvalidFormat,
    /// A `v1` entry was not valid hex.
    #[error("invalid hex encoding")]
    InvalidHex,
    /// No `v1` entry matched the payload.
    #[error("signature mismatch")]
    SignatureMismatch,
    /// Timestamp outside the tolerance window.
    #[error("signature timestamp outside tolerance")]
    Expired,
    /// No webhook secret configured.
    #[error("webhook secret not configured")]
    MissingSecret,
}

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(value: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in value.split(',') {
        let Some((key, val)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(val.parse::<i64>().map_err(|_| SignatureError::InvalidFormat)?);
            }
            "v1" => {
                signatures.push(hex::decode(val).map_err(|_| SignatureError::InvalidHex)?);
            }
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::InvalidFormat)?;
    if signatures.is_empty() {
        return Err(SignatureError::InvalidFormat);
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Verifies `header` against `payload` and returns the signed timestamp.
///
/// `now` is the current unix time in seconds; signatures older or newer
/// than `tolerance_secs` are rejected.
///
/// # Errors
///
/// Returns a [`SignatureError`] describing the first check that failed.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<i64, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let parsed = parse_header(header)?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut signed = parsed.timestamp.to_string().into_bytes();
    signed.push(b'.');
    signed.extend_from_slice(payload);

    let matched = parsed
        .signatures
        .iter()
        .any(|sig| hmac::verify(&key, &signed, sig).is_ok());
    if !matched {
        return Err(SignatureError::SignatureMismatch);
    }

    if now.abs_diff(parsed.timestamp) > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::Expired);
    }
    Ok(parsed.timestamp)
}

/// Produces a header value signing `payload` at `timestamp`.
#[must_use]
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut signed = timestamp.to_string().into_bytes();
    signed.push(b'.');
    signed.extend_from_slice(payload);
    let tag = hmac::sign(&key, &signed);
    format!("t={timestamp},v1={}", hex::encode(tag.as_ref()))
}
