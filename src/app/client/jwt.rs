//! Access token payload decoding
//!
//! CZDS hands out three-part dot separated tokens. Only the payload's `exp`
//! claim is consumed. The signature is not verified: the client trusts the TLS
//! connection it received the token over.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::errors::{AuthError, AuthResult};

/// Token header
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
}

/// Token payload claims
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the epoch
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub scp: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Claims {
    /// Expiry as a UTC timestamp
    pub fn expires_at(&self) -> AuthResult<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidToken {
                reason: format!("exp claim {} is out of range", self.exp),
            })
    }
}

/// A decoded token
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: Header,
    pub claims: Claims,
}

/// Decode a token without verifying its signature
pub fn decode(token: &str) -> AuthResult<DecodedToken> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken {
            reason: format!("token has {} parts not 3", parts.len()),
        });
    }

    let header_bytes = decode_segment(parts[0], "header")?;
    let claims_bytes = decode_segment(parts[1], "payload")?;

    let header = serde_json::from_slice(&header_bytes).map_err(|e| AuthError::InvalidToken {
        reason: format!("failed to parse header: {}", e),
    })?;
    let claims = serde_json::from_slice(&claims_bytes).map_err(|e| AuthError::InvalidToken {
        reason: format!("failed to parse payload: {}", e),
    })?;

    Ok(DecodedToken { header, claims })
}

/// Decode a token and return its expiry
pub fn expiry(token: &str) -> AuthResult<DateTime<Utc>> {
    decode(token)?.claims.expires_at()
}

fn decode_segment(segment: &str, what: &str) -> AuthResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken {
            reason: format!("failed to decode {}: {}", what, e),
        })
}

/// Build an unsigned token carrying the given expiry
#[cfg(test)]
pub(crate) fn encode_for_test(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"kid":"test","alg":"RS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({
            "ver": 1,
            "iss": "https://icann-account.okta.com/oauth2/aus2p01c2ri3A2YUl1t7",
            "sub": "user@example.com",
            "exp": exp,
            "iat": exp - 86_400,
            "scp": ["openid", "icann-customer"],
        })
        .to_string(),
    );
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}
