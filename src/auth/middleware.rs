//! Identity extraction
//!
//! Reads the session cookie and decodes it. Never rejects a request.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::CookieJar;

use super::session::{Identity, decode_identity};
use crate::AppState;

/// Decode the identity carried by the named session cookie
///
/// Absent cookies and malformed tokens both yield `None`.
pub fn identity_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<Identity> {
    let jar = CookieJar::from_headers(headers);
    let token = jar.get(cookie_name)?;
    decode_identity(token.value())
}

/// Optional identity extractor
///
/// # Usage
/// ```ignore
/// async fn handler(MaybeIdentity(identity): MaybeIdentity) -> impl IntoResponse {
///     match identity {
///         Some(identity) => format!("Hello, {}", identity.email),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<Identity>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeIdentity
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
            return Ok(MaybeIdentity(Some(identity)));
        }

        let app_state = AppState::from_ref(state);
        let identity =
            identity_from_headers(&parts.headers, &app_state.config.session.cookie_name);

        if let Some(identity) = &identity {
            parts.extensions.insert(identity.clone());
        }

        Ok(MaybeIdentity(identity))
    }
}
