//! Session cookie decoding
//!
//! The session cookie holds a JWT issued by the hosted auth service.
//! Only the payload is decoded to learn who the caller claims to be.
//!
//! SECURITY: the signature is NOT verified. Anyone can forge an identity
//! by crafting a payload, so the decoded identity must only be used for
//! display, never for authorization.

use serde::Serialize;
use serde_json::Value;

/// Caller identity read from the session token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub email: String,
    /// `user_metadata.full_name` (or `metadata.full_name`)
    pub name: Option<String>,
    /// Full decoded payload
    pub claims: Value,
}

/// Decode a session token into an identity
///
/// Token format: `header.payload.signature`, each segment base64url.
///
/// # Returns
/// `None` for anything that is not a three-segment token whose payload
/// is a JSON object with a string `email`. Failures are never surfaced.
pub fn decode_identity(token: &str) -> Option<Identity> {
    use base64::{Engine as _, engine::general_purpose};

    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        tracing::debug!(segments = segments.len(), "Ignoring malformed session token");
        return None;
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = match general_purpose::URL_SAFE_NO_PAD.decode(payload) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::debug!(%error, "Ignoring session token with undecodable payload");
            return None;
        }
    };

    let claims: Value = match serde_json::from_slice(&bytes) {
        Ok(claims) => claims,
        Err(error) => {
            tracing::debug!(%error, "Ignoring session token with non-JSON payload");
            return None;
        }
    };

    let email = claims.get("email")?.as_str()?.to_string();
    let name = ["user_metadata", "metadata"]
        .iter()
        .filter_map(|field| claims.get(field))
        .find_map(|metadata| metadata.get("full_name").and_then(Value::as_str))
        .map(ToOwned::to_owned);

    Some(Identity {
        email,
        name,
        claims,
    })
}

/// Build an unsigned token around `claims` (tests and local tooling)
pub fn encode_unsigned_token(claims: &Value) -> String {
    use base64::{Engine as _, engine::general_purpose};

    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.")
}
