//! Login, logout and the current user

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::{Value, json};

use super::parse_body;
use crate::access::Caller;
use crate::error::ServiceResult;
use crate::middleware::SessionToken;
use crate::models::{AuthToken, LoginRequest, User};
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<Json<AuthToken>> {
    let payload: LoginRequest = parse_body(body)?;
    Ok(Json(state.service.login(payload).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> ServiceResult<Json<Value>> {
    state.service.logout(&token).await?;
    Ok(Json(json!({ "detail": "Successfully logged out." })))
}

pub async fn current_user(Extension(caller): Extension<Caller>) -> Json<User> {
    Json(caller.into_user())
}
