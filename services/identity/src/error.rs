//! Service error taxonomy and its HTTP mapping
//!
//! Validation failures carry field-level detail. Authentication and
//! authorization failures return fixed messages so responses never reveal
//! more than the caller is entitled to; storage failures are logged here and
//! surfaced as a generic server error.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::{Rejection, StoreError};

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field name -> messages, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn non_field(message: impl Into<String>) -> Self {
        Self::single(NON_FIELD_ERRORS, message)
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Errors surfaced by the identity service
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or missing field, duplicate unique key, invalid enum value
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Unknown id, email or organization type
    #[error("{0}")]
    NotFound(String),

    /// Missing, unknown or inactive-user token
    #[error("authentication required")]
    Unauthorized,

    /// Authenticated but lacking the required tier
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Body shape does not match the request verb
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Constraint violation raised by a concurrent write
    #[error("storage conflict: {0}")]
    StorageConflict(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

/// Type alias for service results
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<FieldErrors> for ServiceError {
    fn from(errors: FieldErrors) -> Self {
        ServiceError::Validation(errors)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, key } => {
                ServiceError::NotFound(format!("{} not found: {}", entity, key))
            }
            StoreError::Duplicate { entity, field } => {
                let article = if entity.starts_with(|c: char| "aeiou".contains(c)) {
                    "An"
                } else {
                    "A"
                };
                ServiceError::Validation(FieldErrors::single(
                    field,
                    format!("{} {} with that {} already exists.", article, entity, field),
                ))
            }
            StoreError::Rejected(Rejection::Invalid(errors)) => ServiceError::Validation(errors),
            StoreError::Rejected(Rejection::Forbidden(reason)) => ServiceError::Forbidden(reason),
            StoreError::Rejected(Rejection::Hidden { entity, key }) => {
                ServiceError::NotFound(format!("{} not found: {}", entity, key))
            }
            StoreError::Conflict(detail) => ServiceError::StorageConflict(detail),
            StoreError::Unexpected(e) => ServiceError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServiceError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_error",
                    "message": "Invalid input.",
                    "fields": fields,
                }),
            ),
            ServiceError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "message": message }),
            ),
            ServiceError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({
                    "error": "unauthorized",
                    "message": "Authentication credentials were not provided or are invalid.",
                }),
            ),
            ServiceError::Forbidden(reason) => {
                warn!("Forbidden: {}", reason);
                (
                    StatusCode::FORBIDDEN,
                    json!({
                        "error": "forbidden",
                        "message": "You do not have permission to perform this action.",
                    }),
                )
            }
            ServiceError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "method_not_allowed", "message": "Method not allowed." }),
            ),
            ServiceError::StorageConflict(detail) => {
                error!("Storage conflict: {}", detail);
                internal_body()
            }
            ServiceError::Internal(detail) => {
                error!("Internal error: {}", detail);
                internal_body()
            }
        };

        (status, Json(body)).into_response()
    }
}

fn internal_body() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "internal_error", "message": "Internal server error" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_accumulate_per_field() {
        let mut errors = FieldErrors::single("email", "first");
        errors.add("email", "second");
        errors.merge(FieldErrors::non_field("whole record"));

        assert_eq!(errors.get("email").map(|m| m.len()), Some(2));
        assert_eq!(
            errors.to_string(),
            "email: first; email: second; non_field_errors: whole record"
        );
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn duplicate_maps_to_field_validation() {
        let err: ServiceError = StoreError::Duplicate {
            entity: "employee",
            field: "email",
        }
        .into();
        match err {
            ServiceError::Validation(fields) => assert_eq!(
                fields.get("email"),
                Some(&["An employee with that email already exists.".to_string()][..])
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn status_codes() {
        let cases = [
            (ServiceError::Validation(FieldErrors::new()), StatusCode::BAD_REQUEST),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::MethodNotAllowed, StatusCode::METHOD_NOT_ALLOWED),
            (
                ServiceError::StorageConflict("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServiceError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
