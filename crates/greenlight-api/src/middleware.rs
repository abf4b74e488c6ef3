use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the JWT, then hand `Claims` to the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, bearer.token()).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Guards cron, admin and diagnostic routes when a service token is configured.
pub async fn require_service_token(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.service_token.as_deref() {
        let presented = bearer.map(|TypedHeader(Authorization(b))| b.token().to_string());
        if presented.as_deref() != Some(expected) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}
