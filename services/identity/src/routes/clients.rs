//! Client routes

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{Method, StatusCode},
};
use serde_json::Value;

use super::{parse_query, parse_shaped};
use crate::access::Caller;
use crate::error::ServiceResult;
use crate::models::{Client, ClientUpdate, NewClient, User};
use crate::query::UserQuery;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ServiceResult<Json<Vec<Client>>> {
    Ok(Json(state.service.list_clients(&caller).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    method: Method,
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<(StatusCode, Json<Client>)> {
    let payload: NewClient = parse_shaped(&method, body)?;
    let client = state.service.create_client(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(org_id): Path<String>,
) -> ServiceResult<Json<Client>> {
    Ok(Json(state.service.get_client(&caller, &org_id).await?))
}

/// PUT and PATCH: partial update of the mutable fields.
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(org_id): Path<String>,
    method: Method,
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<Json<Client>> {
    let payload: ClientUpdate = parse_shaped(&method, body)?;
    Ok(Json(
        state.service.update_client(&caller, &org_id, payload).await?,
    ))
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(org_id): Path<String>,
) -> ServiceResult<StatusCode> {
    state.service.delete_client(&caller, &org_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Users of one client, ordered by email.
pub async fn users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(org_id): Path<String>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> ServiceResult<Json<Vec<User>>> {
    let query = parse_query(query)?;
    Ok(Json(
        state.service.users_for_org(&caller, &org_id, &query).await?,
    ))
}
