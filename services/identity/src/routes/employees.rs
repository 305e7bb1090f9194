//! Employee routes. No tenant scoping: any authenticated caller may read.

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
use crate::models::{Employee, EmployeeFull, EmployeeRestricted};
use crate::query::EmployeeQuery;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<EmployeeQuery>, QueryRejection>,
) -> ServiceResult<Json<Vec<Employee>>> {
    let query = parse_query(query)?;
    Ok(Json(state.service.list_employees(&query).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    method: Method,
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<(StatusCode, Json<Employee>)> {
    let payload: EmployeeFull = parse_shaped(&method, body)?;
    let employee = state.service.create_employee(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn show(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ServiceResult<Json<Employee>> {
    let email = email_segment(&email)?;
    Ok(Json(state.service.get_employee(email).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
    method: Method,
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<Json<Employee>> {
    let email = email_segment(&email)?;
    let payload: EmployeeRestricted = parse_shaped(&method, body)?;
    Ok(Json(
        state.service.update_employee(&caller, email, payload).await?,
    ))
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
) -> ServiceResult<StatusCode> {
    let email = email_segment(&email)?;
    state.service.deactivate_employee(&caller, email).await?;
    Ok(StatusCode::NO_CONTENT)
}
