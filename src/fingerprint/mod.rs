//! Request fingerprinting
//!
//! A fingerprint is the stable identity of a request: a SHA-256 digest of
//! the HTTP method, the normalized URL, and (when supplied) the request
//! body. It is the key used for deduplication and lineage resolution.

mod normalize;

pub use normalize::normalize_url;

use crate::FingerprintError;
use sha2::{Digest, Sha256};

/// Computes the fingerprint for a request
///
/// The URL is normalized first (see [`normalize_url`]), so requests that
/// differ only in query-parameter order, fragment, or host case produce the
/// same fingerprint. The method is uppercased before hashing; requests that
/// differ in method always fingerprint differently.
///
/// # Arguments
///
/// * `method` - HTTP method (e.g. "GET"; case-insensitive)
/// * `url` - Target URL
/// * `body` - Optional request body to include in the identity
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 fingerprint (64 characters)
/// * `Err(FingerprintError)` - Malformed URL or method
pub fn request_fingerprint(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
) -> Result<String, FingerprintError> {
    let method = canonical_method(method)?;
    let normalized = normalize_url(url)?;

    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalized.as_str().as_bytes());
    if let Some(body) = body {
        hasher.update(b"\n");
        hasher.update(body);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Uppercases and validates an HTTP method
pub(crate) fn canonical_method(method: &str) -> Result<String, FingerprintError> {
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(FingerprintError::InvalidMethod(method.to_string()));
    }
    Ok(method.to_ascii_uppercase())
}
