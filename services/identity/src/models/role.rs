//! Organization types and the closed set of role names

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;

/// Classification of a Client; decides which roles its users may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgType {
    Admin,
    Lvl1,
    Lvl2,
    Lvl3,
}

impl OrgType {
    pub const ALL: [OrgType; 4] = [OrgType::Admin, OrgType::Lvl1, OrgType::Lvl2, OrgType::Lvl3];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgType::Admin => "admin",
            OrgType::Lvl1 => "lvl1",
            OrgType::Lvl2 => "lvl2",
            OrgType::Lvl3 => "lvl3",
        }
    }
}

impl fmt::Display for OrgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrgType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        OrgType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseEnumError::new("organization type", s))
    }
}

/// A named capability grant. The set is fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Platform administrator
    #[serde(rename = "ADMIN")]
    Admin,
    /// Organization administrator tier
    #[serde(rename = "LVL1_USER")]
    Lvl1User,
    #[serde(rename = "LVL2_USER")]
    Lvl2User,
    #[serde(rename = "LVL3_USER")]
    Lvl3User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Lvl1User, Role::Lvl2User, Role::Lvl3User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Lvl1User => "LVL1_USER",
            Role::Lvl2User => "LVL2_USER",
            Role::Lvl3User => "LVL3_USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseEnumError::new("role", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_type_parses_case_insensitively() {
        assert_eq!("LVL2".parse::<OrgType>().unwrap(), OrgType::Lvl2);
        assert_eq!(" admin ".parse::<OrgType>().unwrap(), OrgType::Admin);
        assert!("lvl4".parse::<OrgType>().is_err());
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(
            serde_json::to_value(Role::Lvl1User).unwrap(),
            serde_json::json!("LVL1_USER")
        );
        assert_eq!("lvl3_user".parse::<Role>().unwrap(), Role::Lvl3User);
        let err = "Manager".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "\"Manager\" is not a valid role");
    }
}
