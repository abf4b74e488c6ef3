use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use serde::Deserialize;

use greenlight_gateway::connection;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the JWT rides in
/// the query string and is checked before the upgrade.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(q): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = q.token.ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, &token).ok_or(ApiError::Unauthorized)?;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, db, claims.sub, claims.username)
    }))
}
