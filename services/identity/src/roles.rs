//! Role registry: which roles each organization type may hand out
//!
//! The mapping is built once at startup and shared read-only (behind an
//! `Arc`) with every request handler.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::error::FieldErrors;
use crate::models::{OrgType, Role, User};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown organization type: {0}")]
    UnknownOrgType(String),

    #[error("no roles configured for organization type {0}")]
    MissingOrgType(OrgType),
}

/// Immutable `org_type -> ordered roles` mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleRegistry {
    by_org: BTreeMap<OrgType, Vec<Role>>,
}

impl RoleRegistry {
    /// Build a registry from an explicit mapping. Every organization type
    /// must be present; duplicate roles within a list are dropped, keeping
    /// the first occurrence.
    pub fn new(mapping: BTreeMap<OrgType, Vec<Role>>) -> Result<Self, RegistryError> {
        if let Some(missing) = OrgType::ALL.into_iter().find(|t| !mapping.contains_key(t)) {
            return Err(RegistryError::MissingOrgType(missing));
        }

        let by_org = mapping
            .into_iter()
            .map(|(org_type, roles)| {
                let mut seen = BTreeSet::new();
                let roles: Vec<Role> = roles.into_iter().filter(|r| seen.insert(*r)).collect();
                (org_type, roles)
            })
            .collect();

        Ok(Self { by_org })
    }

    /// The deployment mapping: each organization type may grant its own tier
    /// and every tier below it.
    pub fn standard() -> Self {
        let by_org = BTreeMap::from([
            (
                OrgType::Admin,
                vec![Role::Admin, Role::Lvl1User, Role::Lvl2User, Role::Lvl3User],
            ),
            (
                OrgType::Lvl1,
                vec![Role::Lvl1User, Role::Lvl2User, Role::Lvl3User],
            ),
            (OrgType::Lvl2, vec![Role::Lvl2User, Role::Lvl3User]),
            (OrgType::Lvl3, vec![Role::Lvl3User]),
        ]);
        Self { by_org }
    }

    /// Every valid role name.
    pub fn all_roles(&self) -> &'static [Role] {
        &Role::ALL
    }

    /// Roles permitted for the organization type named by `org_type`.
    pub fn roles_for(&self, org_type: &str) -> Result<&[Role], RegistryError> {
        let parsed: OrgType = org_type
            .parse()
            .map_err(|_| RegistryError::UnknownOrgType(org_type.to_string()))?;
        Ok(self.roles_for_type(parsed))
    }

    pub fn roles_for_type(&self, org_type: OrgType) -> &[Role] {
        self.by_org.get(&org_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check that every role is assignable to a user of a client with
    /// `org_type`. Tenant-less users are limited only by the closed role set.
    pub fn validate_assignment(
        &self,
        org_type: Option<OrgType>,
        roles: &[Role],
    ) -> Result<(), FieldErrors> {
        let Some(org_type) = org_type else {
            return Ok(());
        };

        let allowed = self.roles_for_type(org_type);
        let mut errors = FieldErrors::new();
        for role in roles.iter().filter(|r| !allowed.contains(r)) {
            errors.add(
                "roles",
                format!(
                    "Role {} cannot be assigned within a {} organization.",
                    role, org_type
                ),
            );
        }
        errors.into_result()
    }

    /// Check that a client may take `org_type` without stranding a member
    /// on a role the new type does not permit.
    pub fn validate_retype(&self, org_type: OrgType, members: &[User]) -> Result<(), FieldErrors> {
        let allowed = self.roles_for_type(org_type);
        let mut errors = FieldErrors::new();
        for user in members {
            for role in user.roles.iter().filter(|r| !allowed.contains(r)) {
                errors.add(
                    "org_type",
                    format!(
                        "User {} holds role {}, which a {} organization cannot assign.",
                        user.email, role, org_type
                    ),
                );
            }
        }
        errors.into_result()
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
