//! Access token codec.
//!
//! Tokens are compact `header.payload.signature` strings. Only the payload is
//! interpreted here; signatures are checked by the backend, never locally.
//! Every malformed input is treated as "no valid token".

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::session::Role;

/// base64url, accepting payloads with or without `=` padding
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token is empty")]
    Empty,
    #[error("expected 3 token segments, found {0}")]
    Segments(usize),
    #[error("payload is not valid base64url: {0}")]
    Base64(String),
    #[error("payload is not valid JSON: {0}")]
    Json(String),
}

/// Claims carried in the token payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Claims {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    pub role: Option<String>,
    /// NumericDate, which may carry a fractional part
    #[serde(default)]
    pub exp: Option<f64>,
}

impl Claims {
    /// Subject identifier as a string. The backend issues a numeric `id`;
    /// `sub` is accepted when `id` is absent.
    pub fn subject(&self) -> Option<String> {
        let raw = self.id.as_ref().or(self.sub.as_ref())?;
        match raw {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The role claim, if it names a role this client knows.
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::from_str)
    }
}

/// Decode the payload segment of a token without verifying it.
pub fn decode(token: &str) -> Result<Claims, DecodeError> {
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(DecodeError::Segments(parts.len()));
    }

    let bytes = PAYLOAD_ENGINE
        .decode(parts[1])
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))
}

/// `exp` claim in whole seconds since the epoch, rounded down.
pub fn expiration_time(token: &str) -> Option<i64> {
    match decode(token) {
        Ok(claims) => claims.exp.map(|exp| exp.floor() as i64),
        Err(e) => {
            log::debug!("token expiration lookup failed: {}", e);
            None
        }
    }
}

/// Whether the token is expired at `now` (seconds since the epoch).
/// Undecodable tokens and tokens without `exp` count as expired.
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode(token) {
        Ok(Claims { exp: Some(exp), .. }) => exp < now as f64,
        Ok(_) => true,
        Err(e) => {
            log::debug!("token expiry check failed: {}", e);
            true
        }
    }
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, chrono::Utc::now().timestamp())
}

/// Build an unsigned token around `payload`. Used by tests across the crate.
#[cfg(test)]
pub fn encode_unsigned(payload: &Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_decode_numeric_id() {
        let token = encode_unsigned(&json!({"id": 42, "role": "admin", "exp": NOW + 60}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.subject().as_deref(), Some("42"));
        assert_eq!(claims.role(), Some(Role::Admin));
        assert_eq!(claims.exp, Some((NOW + 60) as f64));
    }

    #[test]
    fn test_decode_sub_fallback() {
        let token = encode_unsigned(&json!({"sub": "u-7", "role": "teacher"}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.subject().as_deref(), Some("u-7"));
        assert_eq!(claims.role(), Some(Role::Teacher));
    }

    #[test]
    fn test_decode_padded_payload() {
        use base64::engine::general_purpose::URL_SAFE;
        let body = URL_SAFE.encode(r#"{"id":1}"#);
        assert!(body.ends_with('='));
        let token = format!("h.{}.s", body);
        assert!(decode(&token).is_ok());
    }

    #[test]
    fn test_decode_malformed() {
        assert_eq!(decode(""), Err(DecodeError::Empty));
        assert_eq!(decode("only.two"), Err(DecodeError::Segments(2)));
        assert_eq!(decode("a.b.c.d"), Err(DecodeError::Segments(4)));
        assert!(matches!(decode("a.!!!.c"), Err(DecodeError::Base64(_))));

        let not_json = format!("a.{}.c", PAYLOAD_ENGINE.encode("not json"));
        assert!(matches!(decode(&not_json), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_is_expired() {
        let past = encode_unsigned(&json!({"id": 1, "exp": NOW - 1}));
        let future = encode_unsigned(&json!({"id": 1, "exp": NOW + 3600}));
        assert!(is_expired_at(&past, NOW));
        assert!(!is_expired_at(&future, NOW));
    }

    #[test]
    fn test_fractional_exp() {
        let token = encode_unsigned(&json!({"id": 1, "exp": 1_700_000_000.5}));
        assert!(decode(&token).is_ok());
        assert!(!is_expired_at(&token, NOW));
        assert!(is_expired_at(&token, NOW + 1));
        assert_eq!(expiration_time(&token), Some(NOW));
    }

    #[test]
    fn test_malformed_is_expired() {
        for token in ["", "abc", "a.b", "a.%%%.c"] {
            assert!(is_expired_at(token, NOW), "{:?} should be expired", token);
        }
        let no_exp = encode_unsigned(&json!({"id": 1}));
        assert!(is_expired_at(&no_exp, NOW));
    }

    #[test]
    fn test_expiration_time() {
        let token = encode_unsigned(&json!({"exp": 123}));
        assert_eq!(expiration_time(&token), Some(123));
        assert_eq!(expiration_time("garbage"), None);
    }

    #[test]
    fn test_unknown_role() {
        let token = encode_unsigned(&json!({"id": 1, "role": "student"}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.role.as_deref(), Some("student"));
        assert_eq!(claims.role(), None);
    }
}
