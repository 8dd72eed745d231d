//! Expiry-claim decoding
//!
//! A deliberately narrow view of the access token: the claims segment is a
//! base64url-encoded JSON object carrying an `exp` timestamp. Nothing else
//! is assumed about the token format and the signature is never verified
//! here; a token the client cannot decode stays valid until the backend
//! itself rejects it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("token is not a three-segment token")]
    MalformedToken,

    #[error("claims segment is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("claims segment is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("claims carry no expiry field")]
    MissingExpiry,
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Decode the expiry claim (`exp`, epoch seconds) from an access token.
pub fn decode_expiry(token: &str) -> Result<i64, ClaimError> {
    let mut segments = token.split('.');
    let claims = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(claims), Some(_), None) => claims,
        _ => return Err(ClaimError::MalformedToken),
    };

    let raw = URL_SAFE_NO_PAD.decode(claims)?;
    let parsed: ExpiryClaim = serde_json::from_slice(&raw)?;
    parsed.exp.ok_or(ClaimError::MissingExpiry)
}

/// Expiry claim in epoch milliseconds, `None` if undecodable.
pub fn decode_expiry_ms(token: &str) -> Option<i64> {
    decode_expiry(token).ok().map(|exp| exp * 1000)
}
