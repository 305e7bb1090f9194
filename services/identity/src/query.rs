//! Tenant-scoped query layer
//!
//! The store partitions users by tenant and returns them ordered by email;
//! the filters here narrow those collections further. Status and search
//! filters compose with AND semantics.

use serde::Deserialize;
use std::str::FromStr;

use crate::error::FieldErrors;
use crate::models::{Employee, EmployeeStatus, ParseEnumError, Role, User, UserStatus};

/// Records exposing the fields free-text search looks at.
pub trait Searchable {
    fn search_fields(&self) -> [&str; 3];
}

/// Records carrying a status enum.
pub trait HasStatus {
    type Status: Copy + PartialEq;

    fn status(&self) -> Self::Status;
}

impl Searchable for User {
    fn search_fields(&self) -> [&str; 3] {
        [&self.email, &self.first_name, &self.last_name]
    }
}

impl HasStatus for User {
    type Status = UserStatus;

    fn status(&self) -> UserStatus {
        self.status
    }
}

impl Searchable for Employee {
    fn search_fields(&self) -> [&str; 3] {
        [&self.email, &self.first_name, &self.last_name]
    }
}

impl HasStatus for Employee {
    type Status = EmployeeStatus;

    fn status(&self) -> EmployeeStatus {
        self.status
    }
}

/// Keep records whose status equals `status`.
pub fn filter_by_status<T: HasStatus>(items: impl IntoIterator<Item = T>, status: T::Status) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| item.status() == status)
        .collect()
}

/// Keep records where any searchable field contains `query`, ignoring case.
pub fn search_substring<T: Searchable>(items: impl IntoIterator<Item = T>, query: &str) -> Vec<T> {
    let needle = query.to_lowercase();
    items
        .into_iter()
        .filter(|item| {
            item.search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Parse a `status` query parameter. Absent or empty means no filter; any
/// other value must name a status exactly.
pub fn parse_status_filter<S>(raw: Option<&str>) -> Result<Option<S>, FieldErrors>
where
    S: FromStr<Err = ParseEnumError>,
{
    match raw {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            FieldErrors::single(
                "status",
                format!("Select a valid choice. {} is not one of the available choices.", value),
            )
        }),
    }
}

fn normalize_search(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Query parameters on the user listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
}

/// Query parameters on the employee listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeeQuery {
    pub search: Option<String>,
    pub status: Option<String>,
}

/// Predicate over users. Every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub client: Option<String>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
    pub role: Option<Role>,
}

impl UserFilter {
    pub fn from_query(query: &UserQuery) -> Result<Self, FieldErrors> {
        let status = parse_status_filter(query.status.as_deref());
        let role = match query.role.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<Role>().map(Some).map_err(|_| {
                FieldErrors::single(
                    "role",
                    format!("Select a valid choice. {} is not one of the available choices.", raw),
                )
            }),
        };

        match (status, role) {
            (Ok(status), Ok(role)) => Ok(Self {
                client: None,
                status,
                search: normalize_search(query.search.as_deref()),
                role,
            }),
            (status, role) => {
                let mut errors = FieldErrors::new();
                if let Err(e) = status {
                    errors.merge(e);
                }
                if let Err(e) = role {
                    errors.merge(e);
                }
                Err(errors)
            }
        }
    }

    pub fn within_org(mut self, org_id: &str) -> Self {
        self.client = Some(org_id.to_string());
        self
    }

    /// Narrow `users`, preserving their order.
    pub fn apply(&self, users: Vec<User>) -> Vec<User> {
        let scoped: Vec<User> = users
            .into_iter()
            .filter(|u| {
                self.client
                    .as_deref()
                    .is_none_or(|org_id| u.client.as_deref() == Some(org_id))
            })
            .filter(|u| self.role.is_none_or(|role| u.has_role(role)))
            .collect();

        let scoped = match self.status {
            Some(status) => filter_by_status(scoped, status),
            None => scoped,
        };
        match &self.search {
            Some(query) => search_substring(scoped, query),
            None => scoped,
        }
    }
}

/// Predicate over employees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeFilter {
    pub status: Option<EmployeeStatus>,
    pub search: Option<String>,
}

impl EmployeeFilter {
    pub fn from_query(query: &EmployeeQuery) -> Result<Self, FieldErrors> {
        Ok(Self {
            status: parse_status_filter(query.status.as_deref())?,
            search: normalize_search(query.search.as_deref()),
        })
    }

    pub fn apply(&self, employees: Vec<Employee>) -> Vec<Employee> {
        let employees = match self.status {
            Some(status) => filter_by_status(employees, status),
            None => employees,
        };
        match &self.search {
            Some(query) => search_substring(employees, query),
            None => employees,
        }
    }
}
