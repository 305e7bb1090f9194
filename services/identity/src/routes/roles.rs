//! Role registry routes

use axum::{
    Json,
    extract::{Path, State},
};

use crate::error::ServiceResult;
use crate::models::Role;
use crate::roles::RoleRegistry;
use crate::state::AppState;

/// The whole organization type -> roles mapping.
pub async fn list(State(state): State<AppState>) -> Json<RoleRegistry> {
    Json(state.service.registry().clone())
}

pub async fn show(
    State(state): State<AppState>,
    Path(org_type): Path<String>,
) -> ServiceResult<Json<Vec<Role>>> {
    Ok(Json(state.service.roles_for(&org_type)?))
}
