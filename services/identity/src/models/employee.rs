//! Employee model
//!
//! Employees are plain records: no tenant, no credentials, no roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ParseEnumError, PayloadShape, Shaped, Timestamps, double_option};
use crate::error::FieldErrors;
use crate::validation::{
    NAME_MAX_LEN, PHONE_MAX_LEN, REQUIRED, check_max_len, normalize_email, parse_choice,
    validate_email,
};

pub const EMPLOYEE_ROLE_MAX_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmployeeStatus {
    #[serde(rename = "Full Time")]
    FullTime,
    Contract,
    Candidate,
    Deactivated,
}

impl EmployeeStatus {
    pub const ALL: [EmployeeStatus; 4] = [
        EmployeeStatus::FullTime,
        EmployeeStatus::Contract,
        EmployeeStatus::Candidate,
        EmployeeStatus::Deactivated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::FullTime => "Full Time",
            EmployeeStatus::Contract => "Contract",
            EmployeeStatus::Candidate => "Candidate",
            EmployeeStatus::Deactivated => "Deactivated",
        }
    }
}

impl fmt::Display for EmployeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmployeeStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmployeeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("employee status", s))
    }
}

/// Employee entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Employee {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Free-text job title, unrelated to [`crate::models::Role`].
    pub role: String,
    pub phone: String,
    pub status: EmployeeStatus,
    pub is_active: bool,
    pub date_from: DateTime<Utc>,
    pub date_to: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Employee {
    pub fn set_status(&mut self, status: EmployeeStatus) {
        self.status = status;
        self.is_active = status != EmployeeStatus::Deactivated;
    }

    /// Soft delete.
    pub fn deactivate(&mut self) {
        self.set_status(EmployeeStatus::Deactivated);
    }
}

fn check_fields(
    errors: &mut FieldErrors,
    first_name: Option<&str>,
    last_name: Option<&str>,
    role: Option<&str>,
    phone: Option<&str>,
) {
    if let Some(v) = first_name {
        check_max_len(errors, "first_name", v, NAME_MAX_LEN);
    }
    if let Some(v) = last_name {
        check_max_len(errors, "last_name", v, NAME_MAX_LEN);
    }
    if let Some(v) = role {
        check_max_len(errors, "role", v, EMPLOYEE_ROLE_MAX_LEN);
    }
    if let Some(v) = phone {
        check_max_len(errors, "phone", v, PHONE_MAX_LEN);
    }
}

fn check_range(errors: &mut FieldErrors, from: DateTime<Utc>, to: Option<DateTime<Utc>>) {
    if let Some(to) = to {
        if to < from {
            errors.add("date_to", "date_to must not precede date_from.");
        }
    }
}

/// Full employee payload, accepted on create
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeeFull {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl Shaped for EmployeeFull {
    const SHAPE: PayloadShape = PayloadShape::Full;
}

impl EmployeeFull {
    pub fn validate(self) -> Result<Employee, FieldErrors> {
        let mut errors = FieldErrors::new();

        let email = normalize_email(self.email.as_deref().unwrap_or_default());
        if let Err(msg) = validate_email(&email) {
            errors.add("email", msg);
        }
        check_fields(
            &mut errors,
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.role.as_deref(),
            self.phone.as_deref(),
        );
        let status = match self.status.as_deref() {
            Some(raw) if !raw.is_empty() => parse_choice::<EmployeeStatus>(&mut errors, "status", raw),
            _ => {
                errors.add("status", REQUIRED);
                None
            }
        };
        let now = Utc::now();
        let date_from = self.date_from.unwrap_or(now);
        check_range(&mut errors, date_from, self.date_to);

        errors.into_result()?;

        let mut employee = Employee {
            id: 0,
            email,
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            role: self.role.unwrap_or_default(),
            phone: self.phone.unwrap_or_default(),
            status: EmployeeStatus::Candidate,
            is_active: true,
            date_from,
            date_to: self.date_to,
            timestamps: Timestamps::inserted_at(now),
        };
        if let Some(status) = status {
            employee.set_status(status);
        }
        Ok(employee)
    }
}

/// Restricted employee payload, accepted on update. The email is the lookup
/// key and is not writable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeeRestricted {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_to: Option<Option<DateTime<Utc>>>,
}

impl Shaped for EmployeeRestricted {
    const SHAPE: PayloadShape = PayloadShape::Restricted;
}

/// A validated [`EmployeeRestricted`]
#[derive(Debug, Clone, Default)]
pub struct EmployeeChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub status: Option<EmployeeStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<Option<DateTime<Utc>>>,
}

impl EmployeeRestricted {
    pub fn validate(self) -> Result<EmployeeChanges, FieldErrors> {
        let mut errors = FieldErrors::new();

        check_fields(
            &mut errors,
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.role.as_deref(),
            self.phone.as_deref(),
        );
        let status = self
            .status
            .and_then(|raw| parse_choice(&mut errors, "status", &raw));

        errors.into_result()?;

        Ok(EmployeeChanges {
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            phone: self.phone,
            status,
            date_from: self.date_from,
            date_to: self.date_to,
        })
    }
}

impl EmployeeChanges {
    /// Apply onto `employee`; the resulting date range is checked against
    /// the merged values.
    pub fn apply(self, employee: &mut Employee) -> Result<(), FieldErrors> {
        let date_from = self.date_from.unwrap_or(employee.date_from);
        let date_to = self.date_to.unwrap_or(employee.date_to);
        let mut errors = FieldErrors::new();
        check_range(&mut errors, date_from, date_to);
        errors.into_result()?;

        if let Some(v) = self.first_name {
            employee.first_name = v;
        }
        if let Some(v) = self.last_name {
            employee.last_name = v;
        }
        if let Some(v) = self.role {
            employee.role = v;
        }
        if let Some(v) = self.phone {
            employee.phone = v;
        }
        if let Some(status) = self.status {
            employee.set_status(status);
        }
        employee.date_from = date_from;
        employee.date_to = date_to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn employee() -> Employee {
        serde_json::from_value::<EmployeeFull>(json!({
            "email": "Bob@Corp.io",
            "first_name": "Bob",
            "status": "Full Time",
        }))
        .unwrap()
        .validate()
        .unwrap()
    }

    #[test]
    fn create_defaults() {
        let e = employee();
        assert_eq!(e.email, "bob@corp.io");
        assert_eq!(e.status, EmployeeStatus::FullTime);
        assert!(e.is_active);
        assert!(e.date_to.is_none());
        assert_eq!(serde_json::to_value(&e).unwrap()["status"], json!("Full Time"));
    }

    #[test]
    fn status_is_required_on_create() {
        let errors = EmployeeFull {
            email: Some("x@corp.io".into()),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.get("status"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn deactivate_flips_both_fields() {
        let mut e = employee();
        e.deactivate();
        assert_eq!(e.status, EmployeeStatus::Deactivated);
        assert!(!e.is_active);
    }

    #[test]
    fn update_can_clear_date_to_and_ignores_email() {
        let mut e = employee();
        e.date_to = Some(e.date_from + Duration::days(30));

        let changes: EmployeeRestricted =
            serde_json::from_value(json!({"email": "other@corp.io", "date_to": null, "role": "Ops"}))
                .unwrap();
        changes.validate().unwrap().apply(&mut e).unwrap();

        assert_eq!(e.email, "bob@corp.io");
        assert_eq!(e.role, "Ops");
        assert!(e.date_to.is_none());
    }

    #[test]
    fn update_rejects_inverted_range() {
        let mut e = employee();
        let before = e.date_from - Duration::days(1);
        let changes = EmployeeChanges {
            date_to: Some(Some(before)),
            ..Default::default()
        };
        let errors = changes.apply(&mut e).unwrap_err();
        assert!(errors.get("date_to").is_some());
        assert!(e.date_to.is_none());
    }
}
