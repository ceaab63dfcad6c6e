use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::jwt::JwtManager;
use crate::state::AppState;

/// Verified user id of the caller, if any. Inserted for every request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerIdentity(pub Option<String>);

/// Advisory bearer authentication: a valid token identifies the caller,
/// anything else leaves the request anonymous. Never rejects.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = state
        .jwt_manager
        .as_deref()
        .and_then(|jwt| caller_from_headers(jwt, request.headers()));

    request.extensions_mut().insert(CallerIdentity(caller));
    next.run(request).await
}

fn caller_from_headers(jwt: &JwtManager, headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();

    match jwt.validate_token(token) {
        Ok(claims) => {
            debug!(role = ?claims.role, "Authenticated caller {}", claims.sub);
            Some(claims.sub)
        }
        Err(e) => {
            debug!("Ignoring invalid bearer token: {}", e);
            None
        }
    }
}
