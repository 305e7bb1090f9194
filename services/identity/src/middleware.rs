//! Token authentication middleware

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::ServiceError;
use crate::state::AppState;

/// The raw token a request authenticated with, kept for logout.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Pull the key out of `Authorization: Bearer <key>` or the older
/// `Token <key>` form.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, key) = value.split_once(' ')?;
    let key = key.trim();
    let known = scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token");
    (known && !key.is_empty()).then_some(key)
}

/// Resolve the request's token to an active user and store it as a
/// [`crate::access::Caller`] extension.
pub async fn require_token(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = token_from_headers(req.headers())
        .ok_or(ServiceError::Unauthorized)?
        .to_string();

    let caller = state.service.authenticate(&token).await?;
    debug!(user_id = caller.user().id, "Authenticated request");

    req.extensions_mut().insert(caller);
    req.extensions_mut().insert(SessionToken(token));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_bearer_and_token_schemes() {
        assert_eq!(token_from_headers(&headers("Bearer abc")), Some("abc"));
        assert_eq!(token_from_headers(&headers("Token abc")), Some("abc"));
        assert_eq!(token_from_headers(&headers("bearer abc")), Some("abc"));
    }

    #[test]
    fn rejects_other_shapes() {
        assert_eq!(token_from_headers(&HeaderMap::new()), None);
        assert_eq!(token_from_headers(&headers("Basic abc")), None);
        assert_eq!(token_from_headers(&headers("Bearer")), None);
        assert_eq!(token_from_headers(&headers("Bearer   ")), None);
    }
}
