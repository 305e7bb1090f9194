//! Multi-tenant identity and organization-membership service
//!
//! Clients (tenants) own users; users hold roles drawn from a closed set,
//! restricted per organization type by the [`roles::RoleRegistry`].
//! Employees are standalone records. Everything is exposed over a REST API
//! authenticated with opaque tokens.

pub mod access;
pub mod credentials;
pub mod error;
pub mod middleware;
pub mod models;
pub mod query;
pub mod roles;
pub mod routes;
pub mod seed;
pub mod service;
pub mod settings;
pub mod state;
pub mod store;
pub mod validation;

pub use error::{FieldErrors, ServiceError, ServiceResult};
pub use routes::create_router;
pub use service::IdentityService;
pub use state::AppState;
