//! Access resolver: privilege tiers derived from role membership
//!
//! Tiers are computed from the roles on the record every time they are
//! asked for, never cached, because membership can change between requests.

use serde::Serialize;

use crate::models::{Role, User};

/// Derived privilege flags for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessTier {
    pub is_platform_admin: bool,
    pub is_org_admin: bool,
    pub is_org_user: bool,
}

impl AccessTier {
    pub fn resolve(roles: &[Role]) -> Self {
        let is_platform_admin = roles.contains(&Role::Admin);
        Self {
            is_platform_admin,
            is_org_admin: roles.contains(&Role::Lvl1User),
            is_org_user: !is_platform_admin,
        }
    }

    pub fn of(user: &User) -> Self {
        Self::resolve(&user.roles)
    }
}

/// Validation hook run before any user record is persisted: platform
/// admins always carry the staff and superuser flags.
pub fn clean_user(user: &mut User) {
    if AccessTier::of(user).is_platform_admin {
        user.is_staff = true;
        user.is_superuser = true;
    }
}

/// Which users a caller may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserScope {
    All,
    Org(String),
    Nothing,
}

/// The authenticated user behind a request
#[derive(Debug, Clone)]
pub struct Caller {
    user: User,
}

impl Caller {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn into_user(self) -> User {
        self.user
    }

    pub fn tier(&self) -> AccessTier {
        AccessTier::of(&self.user)
    }

    fn in_org(&self, org_id: &str) -> bool {
        self.user.client.as_deref() == Some(org_id)
    }

    pub fn can_manage_clients(&self) -> bool {
        self.tier().is_platform_admin
    }

    pub fn can_view_org(&self, org_id: &str) -> bool {
        self.tier().is_platform_admin || self.in_org(org_id)
    }

    pub fn user_scope(&self) -> UserScope {
        if self.tier().is_platform_admin {
            return UserScope::All;
        }
        match &self.user.client {
            Some(org_id) => UserScope::Org(org_id.clone()),
            None => UserScope::Nothing,
        }
    }

    pub fn can_view_user(&self, target: &User) -> bool {
        match self.user_scope() {
            UserScope::All => true,
            UserScope::Org(org_id) => target.client.as_deref() == Some(org_id.as_str()),
            UserScope::Nothing => target.id == self.user.id,
        }
    }

    /// Platform admins manage anyone. Org admins manage non-admin users of
    /// their own client.
    pub fn can_manage_user(&self, target: &User) -> bool {
        let tier = self.tier();
        if tier.is_platform_admin {
            return true;
        }
        tier.is_org_admin
            && !AccessTier::of(target).is_platform_admin
            && target.client.as_deref().is_some_and(|org_id| self.in_org(org_id))
    }

    pub fn can_manage_employees(&self) -> bool {
        let tier = self.tier();
        tier.is_platform_admin || tier.is_org_admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, client: Option<&str>, roles: &[Role]) -> User {
        let mut user = User::new(&format!("u{}@x.io", id), "hash".into());
        user.id = id;
        user.client = client.map(str::to_string);
        user.set_roles(roles.iter().copied());
        user
    }

    #[test]
    fn tiers_from_roles() {
        let admin = AccessTier::resolve(&[Role::Admin]);
        assert!(admin.is_platform_admin);
        assert!(!admin.is_org_user);

        let org_admin = AccessTier::resolve(&[Role::Lvl1User]);
        assert!(org_admin.is_org_admin);
        assert!(org_admin.is_org_user);

        let nobody = AccessTier::resolve(&[]);
        assert_eq!(
            nobody,
            AccessTier {
                is_platform_admin: false,
                is_org_admin: false,
                is_org_user: true
            }
        );
    }

    #[test]
    fn clean_forces_admin_flags() {
        let mut admin = user(1, None, &[Role::Admin]);
        assert!(!admin.is_staff);
        clean_user(&mut admin);
        assert!(admin.is_staff && admin.is_superuser);

        let mut plain = user(2, Some("c1"), &[Role::Lvl2User]);
        clean_user(&mut plain);
        assert!(!plain.is_staff && !plain.is_superuser);
    }

    #[test]
    fn tier_reflects_current_membership() {
        let mut u = user(1, Some("c1"), &[Role::Lvl1User]);
        let caller = Caller::new(u.clone());
        assert!(caller.tier().is_org_admin);

        u.set_roles([Role::Lvl3User]);
        assert!(!Caller::new(u).tier().is_org_admin);
    }

    #[test]
    fn scopes() {
        assert_eq!(Caller::new(user(1, None, &[Role::Admin])).user_scope(), UserScope::All);
        assert_eq!(
            Caller::new(user(2, Some("c1"), &[Role::Lvl2User])).user_scope(),
            UserScope::Org("c1".into())
        );
        assert_eq!(Caller::new(user(3, None, &[])).user_scope(), UserScope::Nothing);
    }

    #[test]
    fn org_admin_limits() {
        let org_admin = Caller::new(user(1, Some("c1"), &[Role::Lvl1User]));

        assert!(org_admin.can_manage_user(&user(2, Some("c1"), &[Role::Lvl3User])));
        assert!(!org_admin.can_manage_user(&user(3, Some("c2"), &[Role::Lvl3User])));
        assert!(!org_admin.can_manage_user(&user(4, Some("c1"), &[Role::Admin])));
        assert!(!org_admin.can_manage_user(&user(5, None, &[])));
        assert!(!org_admin.can_manage_clients());
        assert!(org_admin.can_manage_employees());
        assert!(org_admin.can_view_org("c1"));
        assert!(!org_admin.can_view_org("c2"));

        let member = Caller::new(user(6, Some("c1"), &[Role::Lvl2User]));
        assert!(!member.can_manage_user(&user(7, Some("c1"), &[])));
        assert!(!member.can_manage_employees());
    }
}
