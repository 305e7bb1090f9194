//! Identity service models

pub mod client;
pub mod employee;
pub mod role;
pub mod timestamps;
pub mod user;

use axum::http::Method;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

// Re-export for convenience
pub use client::{Client, ClientChanges, ClientUpdate, NewClient};
pub use employee::{Employee, EmployeeChanges, EmployeeFull, EmployeeRestricted, EmployeeStatus};
pub use role::{OrgType, Role};
pub use timestamps::Timestamps;
pub use user::{
    AuthToken, LoginRequest, User, UserChanges, UserDraft, UserFull, UserRestricted, UserStatus,
};

/// Raised when a string does not name a variant of one of the closed enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("\"{value}\" is not a valid {kind}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Which write schema a request body is read with.
///
/// GET and POST use the full shape; PUT and PATCH use the restricted shape,
/// which cannot carry password, email or tenant changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Full,
    Restricted,
}

impl PayloadShape {
    /// Returns `None` for verbs that carry no entity body.
    pub fn for_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET | Method::POST => Some(PayloadShape::Full),
            Method::PUT | Method::PATCH => Some(PayloadShape::Restricted),
            _ => None,
        }
    }
}

/// Implemented by every request body type so the router can refuse to read
/// a body with the wrong shape for its verb.
pub trait Shaped {
    const SHAPE: PayloadShape;
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_follows_verb() {
        assert_eq!(PayloadShape::for_method(&Method::GET), Some(PayloadShape::Full));
        assert_eq!(PayloadShape::for_method(&Method::POST), Some(PayloadShape::Full));
        assert_eq!(
            PayloadShape::for_method(&Method::PUT),
            Some(PayloadShape::Restricted)
        );
        assert_eq!(
            PayloadShape::for_method(&Method::PATCH),
            Some(PayloadShape::Restricted)
        );
        assert_eq!(PayloadShape::for_method(&Method::DELETE), None);
    }
}
