//! User routes, keyed by email

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{Method, StatusCode},
};
use serde_json::Value;

use super::{email_segment, parse_query, parse_shaped};
use crate::access::Caller;
use crate::error::ServiceResult;
use crate::models::{User, UserFull, UserRestricted};
use crate::query::UserQuery;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> ServiceResult<Json<Vec<User>>> {
    let query = parse_query(query)?;
    Ok(Json(state.service.list_users(&caller, &query).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    method: Method,
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<(StatusCode, Json<User>)> {
    let payload: UserFull = parse_shaped(&method, body)?;
    let user = state.service.create_user(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
) -> ServiceResult<Json<User>> {
    let email = email_segment(&email)?;
    Ok(Json(state.service.get_user(&caller, email).await?))
}

/// PUT and PATCH both read the restricted shape; email, client and password
/// keys in the body are ignored.
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
    method: Method,
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<Json<User>> {
    let email = email_segment(&email)?;
    let payload: UserRestricted = parse_shaped(&method, body)?;
    Ok(Json(state.service.update_user(&caller, email, payload).await?))
}

/// Deactivates; the record is never removed.
pub async fn destroy(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
) -> ServiceResult<StatusCode> {
    let email = email_segment(&email)?;
    state.service.deactivate_user(&caller, email).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reactivate(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
) -> ServiceResult<Json<User>> {
    let email = email_segment(&email)?;
    Ok(Json(state.service.reactivate_user(&caller, email).await?))
}
