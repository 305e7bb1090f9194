//! Entity store: persistence for clients, users, employees and tokens
//!
//! Every method is one unit of work. Mutations either apply completely or
//! leave no trace: the Postgres backend wraps each call in a serializable
//! transaction, the in-memory backend stages changes under one write lock.
//!
//! Updates take a hook that runs against the current row inside that unit of
//! work. The hook applies the change and enforces the entity's invariants; if
//! it returns a [`Rejection`] nothing is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::FieldErrors;
use crate::models::{Client, Employee, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Why a hook refused a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Invalid(FieldErrors),
    Forbidden(String),
    /// The caller may not know the row exists.
    Hidden { entity: &'static str, key: String },
}

impl From<FieldErrors> for Rejection {
    fn from(errors: FieldErrors) -> Self {
        Rejection::Invalid(errors)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("duplicate {entity} {field}")]
    Duplicate {
        entity: &'static str,
        field: &'static str,
    },

    #[error("mutation rejected: {0:?}")]
    Rejected(Rejection),

    /// Constraint violation or serialization failure from a concurrent write
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<Rejection> for StoreError {
    fn from(rejection: Rejection) -> Self {
        StoreError::Rejected(rejection)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Runs on a user row (and its client, if any) before it is written.
pub type UserHook = Box<dyn FnOnce(&mut User, Option<&Client>) -> Result<(), Rejection> + Send>;
/// Runs on a client row, alongside its current members, before it is written.
pub type ClientHook = Box<dyn FnOnce(&mut Client, &[User]) -> Result<(), Rejection> + Send>;
/// Runs on an employee row before it is written.
pub type EmployeeHook = Box<dyn FnOnce(&mut Employee) -> Result<(), Rejection> + Send>;

/// Bootstrap data applied as one batch
#[derive(Debug, Clone, Default)]
pub struct SeedBatch {
    pub clients: Vec<Client>,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Applied { clients: usize, users: usize },
    /// At least one of the batch's clients already existed.
    Skipped,
}

pub(crate) fn client_not_found(org_id: &str) -> StoreError {
    StoreError::NotFound {
        entity: "client",
        key: org_id.to_string(),
    }
}

pub(crate) fn user_not_found(email: &str) -> StoreError {
    StoreError::NotFound {
        entity: "user",
        key: email.to_string(),
    }
}

pub(crate) fn employee_not_found(email: &str) -> StoreError {
    StoreError::NotFound {
        entity: "employee",
        key: email.to_string(),
    }
}

pub(crate) fn unknown_client(org_id: &str) -> Rejection {
    Rejection::Invalid(FieldErrors::single(
        "client",
        format!("Invalid pk \"{}\" - object does not exist.", org_id),
    ))
}

pub(crate) fn client_in_use(org_id: &str, users: usize) -> Rejection {
    Rejection::Invalid(FieldErrors::non_field(format!(
        "Client {} still has {} user(s) and cannot be deleted.",
        org_id, users
    )))
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn list_clients(&self) -> StoreResult<Vec<Client>>;
    async fn get_client(&self, org_id: &str) -> StoreResult<Option<Client>>;
    async fn insert_client(&self, client: Client) -> StoreResult<Client>;
    async fn update_client(&self, org_id: &str, hook: ClientHook) -> StoreResult<Client>;
    /// Fails with a rejection while any user still belongs to the client.
    async fn delete_client(&self, org_id: &str) -> StoreResult<()>;

    /// Users ordered by email, restricted to one client when given.
    async fn list_users(&self, client: Option<&str>) -> StoreResult<Vec<User>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Rejects unknown clients; the hook sees the resolved client.
    async fn insert_user(&self, user: User, hook: UserHook) -> StoreResult<User>;
    async fn update_user(&self, email: &str, hook: UserHook) -> StoreResult<User>;

    /// Employees ordered by email.
    async fn list_employees(&self) -> StoreResult<Vec<Employee>>;
    async fn get_employee_by_email(&self, email: &str) -> StoreResult<Option<Employee>>;
    async fn insert_employee(&self, employee: Employee) -> StoreResult<Employee>;
    async fn update_employee(&self, email: &str, hook: EmployeeHook) -> StoreResult<Employee>;

    /// Stamp `last_login` and return the user's token, storing
    /// `candidate_key` when the user has none yet.
    async fn issue_token(
        &self,
        user_id: i64,
        candidate_key: String,
        at: DateTime<Utc>,
    ) -> StoreResult<String>;
    async fn user_for_token(&self, key: &str) -> StoreResult<Option<User>>;
    async fn revoke_token(&self, key: &str) -> StoreResult<bool>;

    async fn seed(&self, batch: SeedBatch) -> StoreResult<SeedOutcome>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
