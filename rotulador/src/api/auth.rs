//! HTTP basic authentication against the project's `auth` section

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::AppState;

/// Challenge sent with every 401
pub const WWW_AUTHENTICATE: &str = r#"Basic realm="restricted", charset="UTF-8""#;

/// Username of the authenticated annotator, available as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Authentication middleware
///
/// Returns 401 with a basic-auth challenge unless the request carries
/// credentials matching a user of the project file.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (username, password) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic_credentials)
        .ok_or(AuthError::MissingCredentials)?;

    if !state.config.auth.contains_key(&username) {
        warn!("auth for user {}: no such user", username);
        return Err(AuthError::InvalidCredentials);
    }

    if !state.config.check_credentials(&username, &password) {
        warn!("auth for user {}: bad password", username);
        return Err(AuthError::InvalidCredentials);
    }

    debug!("auth for user {}: success", username);
    request.extensions_mut().insert(AuthenticatedUser(username));

    Ok(next.run(request).await)
}

/// Decode an `Authorization: Basic ...` header into (username, password)
pub fn parse_basic_credentials(header_value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Authentication failures
#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidCredentials,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(WWW_AUTHENTICATE),
        );
        response
    }
}
