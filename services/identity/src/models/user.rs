//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::{ParseEnumError, PayloadShape, Role, Shaped, Timestamps};
use crate::error::FieldErrors;
use crate::validation::{
    NAME_MAX_LEN, PHONE_MAX_LEN, check_max_len, normalize_email, parse_choice, validate_email,
    validate_password,
};

/// Account status, kept in step with `User::is_active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Deactivated,
}

impl UserStatus {
    pub const ALL: [UserStatus; 2] = [UserStatus::Active, UserStatus::Deactivated];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("user status", s))
    }
}

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub status: UserStatus,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Owning Client's `org_id`; `None` for tenant-less accounts.
    pub client: Option<String>,
    /// Sorted, without duplicates.
    pub roles: Vec<Role>,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl User {
    /// A fresh active account with no roles. `id` is assigned by the store.
    pub fn new(email: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            email: normalize_email(email),
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            status: UserStatus::Active,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            client: None,
            roles: Vec::new(),
            date_joined: now,
            last_login: None,
            timestamps: Timestamps::inserted_at(now),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn set_roles(&mut self, roles: impl IntoIterator<Item = Role>) {
        self.roles = roles.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    }

    pub fn set_status(&mut self, status: UserStatus) {
        self.status = status;
        self.is_active = status == UserStatus::Active;
    }

    /// Soft delete.
    pub fn deactivate(&mut self) {
        self.set_status(UserStatus::Deactivated);
    }

    pub fn reactivate(&mut self) {
        self.set_status(UserStatus::Active);
    }
}

/// Parse role names, recording one `roles` error per unknown name.
pub(crate) fn parse_roles(errors: &mut FieldErrors, raw: Vec<String>) -> Vec<Role> {
    raw.into_iter()
        .filter_map(|name| match name.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                errors.add("roles", format!("Object with name={} does not exist.", name));
                None
            }
        })
        .collect()
}

fn check_profile(
    errors: &mut FieldErrors,
    first_name: Option<&str>,
    last_name: Option<&str>,
    phone: Option<&str>,
) {
    if let Some(first_name) = first_name {
        check_max_len(errors, "first_name", first_name, NAME_MAX_LEN);
    }
    if let Some(last_name) = last_name {
        check_max_len(errors, "last_name", last_name, NAME_MAX_LEN);
    }
    if let Some(phone) = phone {
        check_max_len(errors, "phone", phone, PHONE_MAX_LEN);
    }
}

/// Full user payload, accepted on create
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFull {
    pub email: Option<String>,
    pub password: Option<String>,
    pub client: Option<String>,
    pub phone: Option<String>,
    pub roles: Option<Vec<String>>,
    pub status: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Shaped for UserFull {
    const SHAPE: PayloadShape = PayloadShape::Full;
}

/// A validated [`UserFull`] still holding the plaintext password.
#[derive(Debug, Clone)]
pub struct UserDraft {
    pub email: String,
    pub password: String,
    pub client: Option<String>,
    pub phone: String,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    pub first_name: String,
    pub last_name: String,
}

impl UserFull {
    pub fn validate(self) -> Result<UserDraft, FieldErrors> {
        let mut errors = FieldErrors::new();

        let email = normalize_email(self.email.as_deref().unwrap_or_default());
        if let Err(msg) = validate_email(&email) {
            errors.add("email", msg);
        }
        let password = self.password.unwrap_or_default();
        if let Err(msg) = validate_password(&password) {
            errors.add("password", msg);
        }
        check_profile(
            &mut errors,
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.phone.as_deref(),
        );
        let roles = parse_roles(&mut errors, self.roles.unwrap_or_default());
        let status = match self.status {
            Some(raw) => parse_choice(&mut errors, "status", &raw),
            None => Some(UserStatus::Active),
        };
        let client = self
            .client
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        errors.into_result()?;

        Ok(UserDraft {
            email,
            password,
            client,
            phone: self.phone.unwrap_or_default(),
            roles,
            status: status.unwrap_or(UserStatus::Active),
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
        })
    }
}

impl UserDraft {
    pub fn into_user(self, password_hash: String) -> User {
        let mut user = User::new(&self.email, password_hash);
        user.client = self.client;
        user.phone = self.phone;
        user.first_name = self.first_name;
        user.last_name = self.last_name;
        user.set_roles(self.roles);
        user.set_status(self.status);
        user
    }
}

/// Restricted user payload, accepted on update. Email, password and client
/// cannot be expressed here; such keys in a request body are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRestricted {
    pub phone: Option<String>,
    pub roles: Option<Vec<String>>,
    pub status: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Shaped for UserRestricted {
    const SHAPE: PayloadShape = PayloadShape::Restricted;
}

/// A validated [`UserRestricted`]
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub phone: Option<String>,
    pub roles: Option<Vec<Role>>,
    pub status: Option<UserStatus>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserRestricted {
    pub fn validate(self) -> Result<UserChanges, FieldErrors> {
        let mut errors = FieldErrors::new();

        check_profile(
            &mut errors,
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.phone.as_deref(),
        );
        let roles = self.roles.map(|raw| parse_roles(&mut errors, raw));
        let status = self
            .status
            .and_then(|raw| parse_choice(&mut errors, "status", &raw));

        errors.into_result()?;

        Ok(UserChanges {
            phone: self.phone,
            roles,
            status,
            first_name: self.first_name,
            last_name: self.last_name,
        })
    }
}

impl UserChanges {
    pub fn apply(self, user: &mut User) {
        if let Some(phone) = self.phone {
            user.phone = phone;
        }
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(roles) = self.roles {
            user.set_roles(roles);
        }
        if let Some(status) = self.status {
            user.set_status(status);
        }
    }
}

/// User login credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Issued bearer token
#[derive(Debug, Clone, Serialize)]
pub struct AuthToken {
    pub token: String,
}
