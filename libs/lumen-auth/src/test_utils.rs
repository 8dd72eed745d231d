//! Test utilities for token-lifecycle testing
//!
//! Builds unsigned tokens whose claims segment decodes the way the
//! production path expects. Shared with downstream crates' tests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Build a three-segment token with the given raw claims JSON.
pub fn token_with_claims(claims: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let body = URL_SAFE_NO_PAD.encode(claims);
    format!("{header}.{body}.sig")
}

/// Build a token expiring at `exp` (epoch seconds).
pub fn token_with_expiry(exp: i64) -> String {
    token_with_claims(&format!(r#"{{"sub":"test-user","exp":{exp}}}"#))
}

/// Build a token with no decodable expiry claim.
pub fn token_without_expiry() -> String {
    token_with_claims(r#"{"sub":"test-user"}"#)
}
