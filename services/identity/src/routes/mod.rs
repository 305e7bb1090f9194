//! HTTP surface
//!
//! Everything except `/health` sits under `/api/v1` behind the token
//! middleware. Write bodies are read with the shape their verb allows.

mod auth;
mod clients;
mod employees;
mod roles;
mod users;

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::error;

use crate::error::{FieldErrors, ServiceError, ServiceResult};
use crate::middleware::require_token;
use crate::models::{PayloadShape, Shaped};
use crate::state::AppState;
use crate::validation::is_email_path;

/// Create the router for the identity service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/user", get(auth::current_user))
        .route("/clients", get(clients::list).post(clients::create))
        .route(
            "/clients/:org_id",
            get(clients::show)
                .put(clients::update)
                .patch(clients::update)
                .delete(clients::destroy),
        )
        .route("/clients/:org_id/users", get(clients::users))
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/:email",
            get(users::show)
                .put(users::update)
                .patch(users::update)
                .delete(users::destroy),
        )
        .route("/users/:email/reactivate", post(users::reactivate))
        .route("/employees", get(employees::list).post(employees::create))
        .route(
            "/employees/:email",
            get(employees::show)
                .put(employees::update)
                .patch(employees::update)
                .delete(employees::destroy),
        )
        .route("/roles", get(roles::list))
        .route("/roles/:org_type", get(roles::show))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let api = Router::new()
        .route("/auth/login", post(auth::login))
        .merge(protected);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.service.store();
    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "backend": store.backend_name() })),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "backend": store.backend_name() })),
            )
        }
    }
}

/// Read a request body as `T`, refusing when `T`'s shape is not the one the
/// verb allows.
pub(crate) fn parse_shaped<T>(
    method: &Method,
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<T>
where
    T: Shaped + DeserializeOwned,
{
    if PayloadShape::for_method(method) != Some(T::SHAPE) {
        return Err(ServiceError::MethodNotAllowed);
    }
    parse_body(body)
}

pub(crate) fn parse_body<T: DeserializeOwned>(
    body: Result<Json<Value>, JsonRejection>,
) -> ServiceResult<T> {
    let Json(value) = body.map_err(|rejection| FieldErrors::non_field(rejection.body_text()))?;
    if !value.is_object() {
        return Err(FieldErrors::non_field("Expected a JSON object.").into());
    }
    serde_json::from_value(value).map_err(|e| FieldErrors::non_field(e.to_string()).into())
}

/// Query strings that fail to deserialize become validation errors.
pub(crate) fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> ServiceResult<T> {
    let Query(query) = query.map_err(|rejection| FieldErrors::non_field(rejection.body_text()))?;
    Ok(query)
}

/// Email path segments that are not email-shaped match no route.
pub(crate) fn email_segment(raw: &str) -> ServiceResult<&str> {
    if is_email_path(raw) {
        Ok(raw)
    } else {
        Err(ServiceError::NotFound(format!("no such resource: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientUpdate, UserFull, UserRestricted};

    fn body(value: Value) -> Result<Json<Value>, JsonRejection> {
        Ok(Json(value))
    }

    #[test]
    fn shape_follows_the_verb() {
        let full: ServiceResult<UserFull> =
            parse_shaped(&Method::POST, body(json!({"email": "a@x.io"})));
        assert!(full.is_ok());

        let wrong: ServiceResult<UserFull> =
            parse_shaped(&Method::PATCH, body(json!({"email": "a@x.io"})));
        assert!(matches!(wrong, Err(ServiceError::MethodNotAllowed)));

        let restricted: ServiceResult<UserRestricted> =
            parse_shaped(&Method::PUT, body(json!({"first_name": "A"})));
        assert!(restricted.is_ok());

        let deleted: ServiceResult<ClientUpdate> = parse_shaped(&Method::DELETE, body(json!({})));
        assert!(matches!(deleted, Err(ServiceError::MethodNotAllowed)));
    }

    #[test]
    fn restricted_shape_drops_protected_keys() {
        let changes: UserRestricted = parse_shaped(
            &Method::PATCH,
            body(json!({"email": "evil@x.io", "client": "other", "password": "x", "phone": "1"})),
        )
        .unwrap();
        assert_eq!(changes.phone.as_deref(), Some("1"));
    }

    #[test]
    fn non_object_bodies_are_validation_errors() {
        let result: ServiceResult<UserRestricted> = parse_shaped(&Method::PATCH, body(json!([1])));
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn malformed_query_strings_are_validation_errors() {
        use crate::query::UserQuery;
        use axum::http::Uri;

        let parse = |uri: &'static str| -> ServiceResult<UserQuery> {
            parse_query(Query::try_from_uri(&Uri::from_static(uri)))
        };
        let query = parse("/users?status=active&search=lee").unwrap();
        assert_eq!(query.status.as_deref(), Some("active"));
        assert!(matches!(
            parse("/users?status=active&status=deactivated"),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn email_segments_must_look_like_emails() {
        assert!(email_segment("a@x.io").is_ok());
        assert!(matches!(email_segment("42"), Err(ServiceError::NotFound(_))));
    }
}
