//! Identity service: every entity operation, gated by the caller's tier
//!
//! Handlers stay thin and call into [`IdentityService`]. Mutations hand the
//! store a hook that re-checks access, validates role assignments against
//! the [`RoleRegistry`] and runs [`clean_user`] on the locked row, so checks
//! and writes land in the same unit of work.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::access::{Caller, UserScope, clean_user};
use crate::credentials::{generate_token_key, hash_password, verify_password};
use crate::error::{FieldErrors, ServiceError, ServiceResult};
use crate::models::{
    AuthToken, Client, ClientUpdate, Employee, EmployeeFull, EmployeeRestricted, LoginRequest,
    NewClient, Role, User, UserFull, UserRestricted,
};
use crate::query::{EmployeeFilter, EmployeeQuery, UserFilter, UserQuery};
use crate::roles::RoleRegistry;
use crate::store::{IdentityStore, Rejection, UserHook};
use crate::validation::normalize_email;

pub const LOGIN_INVALID: &str = "Unable to log in with provided credentials.";
pub const LOGIN_DISABLED: &str = "User account is disabled.";
pub const LOGIN_INCOMPLETE: &str = "Must include \"email\" and \"password\".";

/// Application service over an [`IdentityStore`]
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn IdentityStore>,
    registry: Arc<RoleRegistry>,
    uniform_login_errors: bool,
}

fn forbidden(action: &str) -> ServiceError {
    ServiceError::Forbidden(format!("not permitted to {}", action))
}

fn user_not_found(email: &str) -> ServiceError {
    ServiceError::NotFound(format!("user not found: {}", email))
}

/// What a user write does to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserWrite {
    Create,
    Update { sets_roles: bool },
}

impl UserWrite {
    fn existing(self) -> bool {
        matches!(self, UserWrite::Update { .. })
    }

    fn sets_roles(self) -> bool {
        match self {
            UserWrite::Create => true,
            UserWrite::Update { sets_roles } => sets_roles,
        }
    }
}

/// Hook shared by user create and update: the caller must be allowed to
/// manage the row as it will be written, newly set roles must fit the
/// client's organization type, and admin flags are forced on.
fn admit_user(
    registry: Arc<RoleRegistry>,
    caller: Caller,
    change: impl FnOnce(&mut User) + Send + 'static,
    write: UserWrite,
) -> UserHook {
    Box::new(move |user: &mut User, client: Option<&Client>| {
        if write.existing() {
            if !caller.can_view_user(user) {
                return Err(Rejection::Hidden {
                    entity: "user",
                    key: user.email.clone(),
                });
            }
            if !caller.can_manage_user(user) {
                return Err(Rejection::Forbidden(format!("manage user {}", user.email)));
            }
        }

        change(user);

        if write.sets_roles() {
            registry.validate_assignment(client.map(|c| c.org_type), &user.roles)?;
        }
        if !caller.can_manage_user(user) {
            return Err(Rejection::Forbidden(format!("write user {}", user.email)));
        }
        clean_user(user);
        Ok(())
    })
}

impl IdentityService {
    pub fn new(store: Arc<dyn IdentityStore>, registry: Arc<RoleRegistry>) -> Self {
        Self {
            store,
            registry,
            uniform_login_errors: false,
        }
    }

    /// Report disabled accounts with the same message as bad credentials.
    pub fn with_uniform_login_errors(mut self, uniform: bool) -> Self {
        self.uniform_login_errors = uniform;
        self
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    // ---- clients ----

    pub async fn list_clients(&self, caller: &Caller) -> ServiceResult<Vec<Client>> {
        let clients = self.store.list_clients().await?;
        Ok(clients
            .into_iter()
            .filter(|c| caller.can_view_org(&c.org_id))
            .collect())
    }

    pub async fn get_client(&self, caller: &Caller, org_id: &str) -> ServiceResult<Client> {
        let not_found = || ServiceError::NotFound(format!("client not found: {}", org_id));
        if !caller.can_view_org(org_id) {
            return Err(not_found());
        }
        self.store.get_client(org_id).await?.ok_or_else(not_found)
    }

    pub async fn create_client(&self, caller: &Caller, payload: NewClient) -> ServiceResult<Client> {
        if !caller.can_manage_clients() {
            return Err(forbidden("create clients"));
        }
        let client = payload.validate()?;
        let client = self.store.insert_client(client).await?;
        info!(org_id = %client.org_id, org_type = %client.org_type, "Created client");
        Ok(client)
    }

    pub async fn update_client(
        &self,
        caller: &Caller,
        org_id: &str,
        payload: ClientUpdate,
    ) -> ServiceResult<Client> {
        if !caller.can_manage_clients() {
            return Err(forbidden("update clients"));
        }
        let changes = payload.validate()?;
        let registry = self.registry.clone();
        let client = self
            .store
            .update_client(
                org_id,
                Box::new(move |client: &mut Client, members: &[User]| {
                    if let Some(org_type) = changes.org_type.filter(|t| *t != client.org_type) {
                        registry.validate_retype(org_type, members)?;
                    }
                    changes.apply(client);
                    Ok(())
                }),
            )
            .await?;
        info!(org_id = %client.org_id, "Updated client");
        Ok(client)
    }

    /// Hard delete, refused while any user belongs to the client.
    pub async fn delete_client(&self, caller: &Caller, org_id: &str) -> ServiceResult<()> {
        if !caller.can_manage_clients() {
            return Err(forbidden("delete clients"));
        }
        self.store.delete_client(org_id).await?;
        info!(org_id = %org_id, "Deleted client");
        Ok(())
    }

    /// Users of one client ordered by email. An unknown client is NotFound; a
    /// client without users yields an empty list.
    pub async fn users_for_org(
        &self,
        caller: &Caller,
        org_id: &str,
        query: &UserQuery,
    ) -> ServiceResult<Vec<User>> {
        let filter = UserFilter::from_query(query)?.within_org(org_id);
        self.get_client(caller, org_id).await?;
        let users = self.store.list_users(Some(org_id)).await?;
        Ok(filter.apply(users))
    }

    // ---- users ----

    pub async fn list_users(&self, caller: &Caller, query: &UserQuery) -> ServiceResult<Vec<User>> {
        let filter = UserFilter::from_query(query)?;
        let users = match caller.user_scope() {
            UserScope::All => self.store.list_users(None).await?,
            UserScope::Org(org_id) => self.store.list_users(Some(&org_id)).await?,
            UserScope::Nothing => self
                .store
                .get_user_by_email(&caller.user().email)
                .await?
                .into_iter()
                .collect(),
        };
        Ok(filter.apply(users))
    }

    pub async fn get_user(&self, caller: &Caller, email: &str) -> ServiceResult<User> {
        let email = normalize_email(email);
        match self.store.get_user_by_email(&email).await? {
            Some(user) if caller.can_view_user(&user) => Ok(user),
            _ => Err(user_not_found(&email)),
        }
    }

    pub async fn create_user(&self, caller: &Caller, payload: UserFull) -> ServiceResult<User> {
        let draft = payload.validate()?;
        let password_hash = hash_password(&draft.password)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let user = draft.into_user(password_hash);
        if !caller.can_manage_user(&user) {
            return Err(forbidden("create this user"));
        }

        let hook = admit_user(
            self.registry.clone(),
            caller.clone(),
            |_| {},
            UserWrite::Create,
        );
        let user = self.store.insert_user(user, hook).await?;
        info!(
            user_id = user.id,
            email = %user.email,
            client = ?user.client,
            "Created user"
        );
        Ok(user)
    }

    /// Partial update through the restricted shape.
    pub async fn update_user(
        &self,
        caller: &Caller,
        email: &str,
        payload: UserRestricted,
    ) -> ServiceResult<User> {
        let changes = payload.validate()?;
        let email = normalize_email(email);
        let write = UserWrite::Update {
            sets_roles: changes.roles.is_some(),
        };
        let hook = admit_user(
            self.registry.clone(),
            caller.clone(),
            move |user| changes.apply(user),
            write,
        );
        let user = self.store.update_user(&email, hook).await?;
        info!(user_id = user.id, email = %user.email, "Updated user");
        Ok(user)
    }

    /// Soft delete: the record stays listed with status `deactivated`.
    pub async fn deactivate_user(&self, caller: &Caller, email: &str) -> ServiceResult<User> {
        let email = normalize_email(email);
        let hook = admit_user(
            self.registry.clone(),
            caller.clone(),
            User::deactivate,
            UserWrite::Update { sets_roles: false },
        );
        let user = self.store.update_user(&email, hook).await?;
        info!(user_id = user.id, email = %user.email, "Deactivated user");
        Ok(user)
    }

    pub async fn reactivate_user(&self, caller: &Caller, email: &str) -> ServiceResult<User> {
        let email = normalize_email(email);
        let hook = admit_user(
            self.registry.clone(),
            caller.clone(),
            User::reactivate,
            UserWrite::Update { sets_roles: false },
        );
        let user = self.store.update_user(&email, hook).await?;
        info!(user_id = user.id, email = %user.email, "Reactivated user");
        Ok(user)
    }

    // ---- employees ----

    pub async fn list_employees(&self, query: &EmployeeQuery) -> ServiceResult<Vec<Employee>> {
        let filter = EmployeeFilter::from_query(query)?;
        Ok(filter.apply(self.store.list_employees().await?))
    }

    pub async fn get_employee(&self, email: &str) -> ServiceResult<Employee> {
        let email = normalize_email(email);
        self.store
            .get_employee_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("employee not found: {}", email)))
    }

    pub async fn create_employee(
        &self,
        caller: &Caller,
        payload: EmployeeFull,
    ) -> ServiceResult<Employee> {
        if !caller.can_manage_employees() {
            return Err(forbidden("create employees"));
        }
        let employee = self.store.insert_employee(payload.validate()?).await?;
        info!(employee_id = employee.id, email = %employee.email, "Created employee");
        Ok(employee)
    }

    pub async fn update_employee(
        &self,
        caller: &Caller,
        email: &str,
        payload: EmployeeRestricted,
    ) -> ServiceResult<Employee> {
        if !caller.can_manage_employees() {
            return Err(forbidden("update employees"));
        }
        let changes = payload.validate()?;
        let email = normalize_email(email);
        let employee = self
            .store
            .update_employee(
                &email,
                Box::new(move |employee: &mut Employee| {
                    changes.apply(employee).map_err(Rejection::from)
                }),
            )
            .await?;
        info!(employee_id = employee.id, email = %employee.email, "Updated employee");
        Ok(employee)
    }

    /// Soft delete: status `Deactivated`, `is_active` false.
    pub async fn deactivate_employee(&self, caller: &Caller, email: &str) -> ServiceResult<Employee> {
        if !caller.can_manage_employees() {
            return Err(forbidden("deactivate employees"));
        }
        let email = normalize_email(email);
        let employee = self
            .store
            .update_employee(
                &email,
                Box::new(|employee: &mut Employee| {
                    employee.deactivate();
                    Ok(())
                }),
            )
            .await?;
        info!(employee_id = employee.id, email = %employee.email, "Deactivated employee");
        Ok(employee)
    }

    // ---- roles ----

    /// Roles assignable within the organization type named by `org_type`.
    pub fn roles_for(&self, org_type: &str) -> ServiceResult<Vec<Role>> {
        self.registry
            .roles_for(org_type)
            .map(<[Role]>::to_vec)
            .map_err(|e| ServiceError::NotFound(e.to_string()))
    }

    // ---- authentication ----

    /// Exchange credentials for the user's token, creating it on first login.
    pub async fn login(&self, payload: LoginRequest) -> ServiceResult<AuthToken> {
        let email = payload
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());
        let password = payload.password.filter(|p| !p.is_empty());
        let (Some(email), Some(password)) = (email, password) else {
            return Err(FieldErrors::non_field(LOGIN_INCOMPLETE).into());
        };

        let user = match self.store.get_user_by_email(&email).await? {
            Some(user) if verify_password(&password, &user.password_hash) => user,
            _ => {
                warn!(email = %email, "Login rejected: bad credentials");
                return Err(FieldErrors::non_field(LOGIN_INVALID).into());
            }
        };
        if !user.is_active {
            warn!(user_id = user.id, "Login rejected: account disabled");
            let message = if self.uniform_login_errors {
                LOGIN_INVALID
            } else {
                LOGIN_DISABLED
            };
            return Err(FieldErrors::non_field(message).into());
        }

        let token = self
            .store
            .issue_token(user.id, generate_token_key(), Utc::now())
            .await?;
        info!(user_id = user.id, "User logged in");
        Ok(AuthToken { token })
    }

    /// Drop the caller's token. Returns whether one existed.
    pub async fn logout(&self, token: &str) -> ServiceResult<bool> {
        Ok(self.store.revoke_token(token).await?)
    }

    /// Resolve a token to an active user.
    pub async fn authenticate(&self, token: &str) -> ServiceResult<Caller> {
        match self.store.user_for_token(token).await? {
            Some(user) if user.is_active => Ok(Caller::new(user)),
            _ => Err(ServiceError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrgType, Timestamps, UserStatus};
    use crate::store::MemoryStore;

    fn service() -> IdentityService {
        IdentityService::new(Arc::new(MemoryStore::new()), Arc::new(RoleRegistry::standard()))
    }

    fn root() -> Caller {
        let mut user = User::new("root@x.io", String::new());
        user.set_roles([Role::Admin]);
        Caller::new(user)
    }

    async fn add_client(svc: &IdentityService, org_id: &str, org_type: OrgType) {
        svc.store
            .insert_client(Client {
                org_id: org_id.into(),
                name: org_id.into(),
                address: String::new(),
                phone: String::new(),
                org_type,
                timestamps: Timestamps::default(),
            })
            .await
            .unwrap();
    }

    fn new_user(email: &str, client: Option<&str>, roles: &[&str]) -> UserFull {
        UserFull {
            email: Some(email.into()),
            password: Some("pw".into()),
            client: client.map(str::to_string),
            roles: Some(roles.iter().map(|r| r.to_string()).collect()),
            ..UserFull::default()
        }
    }

    async fn caller_for(svc: &IdentityService, email: &str) -> Caller {
        Caller::new(svc.store.get_user_by_email(email).await.unwrap().unwrap())
    }

    #[tokio::test]
    async fn created_admins_are_cleaned() {
        let svc = service();
        add_client(&svc, "hq", OrgType::Admin).await;
        let user = svc
            .create_user(&root(), new_user("Boss@X.io", Some("hq"), &["ADMIN"]))
            .await
            .unwrap();

        assert_eq!(user.email, "boss@x.io");
        assert!(user.is_staff && user.is_superuser);
        assert_ne!(user.password_hash, "pw");
    }

    #[tokio::test]
    async fn roles_must_fit_the_client_org_type() {
        let svc = service();
        add_client(&svc, "small", OrgType::Lvl3).await;
        let err = svc
            .create_user(&root(), new_user("a@x.io", Some("small"), &["LVL1_USER"]))
            .await
            .unwrap_err();

        let ServiceError::Validation(fields) = err else {
            panic!("expected a validation error");
        };
        assert!(fields.get("roles").is_some());
        assert!(svc.store.get_user_by_email("a@x.io").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn admin_granted_on_update_is_cleaned() {
        let svc = service();
        add_client(&svc, "hq", OrgType::Admin).await;
        svc.create_user(&root(), new_user("ops@x.io", Some("hq"), &["LVL2_USER"]))
            .await
            .unwrap();

        let promote = UserRestricted {
            roles: Some(vec!["ADMIN".into()]),
            ..UserRestricted::default()
        };
        let user = svc.update_user(&root(), "ops@x.io", promote).await.unwrap();
        assert_eq!(user.roles, vec![Role::Admin]);
        assert!(user.is_staff && user.is_superuser);

        let stored = svc.store.get_user_by_email("ops@x.io").await.unwrap().unwrap();
        assert!(stored.is_staff && stored.is_superuser);
    }

    #[tokio::test]
    async fn client_downgrade_is_refused_while_members_outrank_it() {
        let svc = service();
        add_client(&svc, "one", OrgType::Lvl1).await;
        svc.create_user(&root(), new_user("lead@x.io", Some("one"), &["LVL1_USER"]))
            .await
            .unwrap();
        let downgrade = || ClientUpdate {
            org_type: Some("lvl3".into()),
            ..ClientUpdate::default()
        };

        let err = svc.update_client(&root(), "one", downgrade()).await.unwrap_err();
        let ServiceError::Validation(fields) = err else {
            panic!("expected a validation error");
        };
        assert!(fields.get("org_type").is_some());
        let client = svc.get_client(&root(), "one").await.unwrap();
        assert_eq!(client.org_type, OrgType::Lvl1);

        // Deleting still works, and the retype goes through once the role is gone.
        svc.deactivate_user(&root(), "lead@x.io").await.unwrap();
        let demote = UserRestricted {
            roles: Some(vec!["LVL3_USER".into()]),
            ..UserRestricted::default()
        };
        svc.update_user(&root(), "lead@x.io", demote).await.unwrap();
        let client = svc.update_client(&root(), "one", downgrade()).await.unwrap();
        assert_eq!(client.org_type, OrgType::Lvl3);
    }

    #[tokio::test]
    async fn writes_that_keep_roles_skip_the_assignment_check() {
        let svc = service();
        add_client(&svc, "small", OrgType::Lvl3).await;
        // A row whose roles no longer fit its client, as left by older data.
        let mut legacy = User::new("old@x.io", String::new());
        legacy.client = Some("small".into());
        legacy.set_roles([Role::Lvl1User]);
        svc.store
            .insert_user(legacy, Box::new(|_: &mut User, _: Option<&Client>| Ok(())))
            .await
            .unwrap();

        let profile = UserRestricted {
            phone: Some("1".into()),
            ..UserRestricted::default()
        };
        let user = svc.update_user(&root(), "old@x.io", profile).await.unwrap();
        assert_eq!(user.phone, "1");

        let user = svc.deactivate_user(&root(), "old@x.io").await.unwrap();
        assert_eq!(user.status, UserStatus::Deactivated);
        let user = svc.reactivate_user(&root(), "old@x.io").await.unwrap();
        assert!(user.is_active);

        let regrant = UserRestricted {
            roles: Some(vec!["LVL1_USER".into()]),
            ..UserRestricted::default()
        };
        assert!(matches!(
            svc.update_user(&root(), "old@x.io", regrant).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn org_admins_cannot_grant_admin_or_cross_tenants() {
        let svc = service();
        add_client(&svc, "one", OrgType::Admin).await;
        add_client(&svc, "two", OrgType::Lvl1).await;
        svc.create_user(&root(), new_user("lead@x.io", Some("one"), &["LVL1_USER"]))
            .await
            .unwrap();
        svc.create_user(&root(), new_user("peer@x.io", Some("one"), &["LVL2_USER"]))
            .await
            .unwrap();
        svc.create_user(&root(), new_user("far@x.io", Some("two"), &[]))
            .await
            .unwrap();
        let lead = caller_for(&svc, "lead@x.io").await;

        let escalate = UserRestricted {
            roles: Some(vec!["ADMIN".into()]),
            ..UserRestricted::default()
        };
        assert!(matches!(
            svc.update_user(&lead, "peer@x.io", escalate).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            svc.deactivate_user(&lead, "far@x.io").await,
            Err(ServiceError::NotFound(_))
        ));

        let peer = svc.deactivate_user(&lead, "peer@x.io").await.unwrap();
        assert_eq!(peer.status, UserStatus::Deactivated);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_callers_client() {
        let svc = service();
        add_client(&svc, "one", OrgType::Lvl1).await;
        add_client(&svc, "two", OrgType::Lvl1).await;
        for (email, org) in [("b@x.io", "one"), ("a@x.io", "one"), ("c@x.io", "two")] {
            svc.create_user(&root(), new_user(email, Some(org), &["LVL2_USER"]))
                .await
                .unwrap();
        }
        let member = caller_for(&svc, "b@x.io").await;

        let seen: Vec<String> = svc
            .list_users(&member, &UserQuery::default())
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.email)
            .collect();
        assert_eq!(seen, ["a@x.io", "b@x.io"]);
        assert!(matches!(
            svc.get_user(&member, "c@x.io").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.users_for_org(&member, "two", &UserQuery::default()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn users_for_org_distinguishes_empty_from_unknown() {
        let svc = service();
        add_client(&svc, "empty", OrgType::Lvl2).await;

        let users = svc
            .users_for_org(&root(), "empty", &UserQuery::default())
            .await
            .unwrap();
        assert!(users.is_empty());
        assert!(matches!(
            svc.users_for_org(&root(), "ghost", &UserQuery::default()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn login_issues_one_token_and_reports_disabled_accounts() {
        let svc = service();
        svc.create_user(&root(), new_user("a@x.io", None, &[])).await.unwrap();
        let login = |password: &str| LoginRequest {
            email: Some("A@x.io ".into()),
            password: Some(password.into()),
        };

        let first = svc.login(login("pw")).await.unwrap();
        let second = svc.login(login("pw")).await.unwrap();
        assert_eq!(first.token, second.token);
        let caller = svc.authenticate(&first.token).await.unwrap();
        assert!(caller.user().last_login.is_some());

        let err = svc.login(login("wrong")).await.unwrap_err();
        assert!(err.to_string().contains(LOGIN_INVALID));

        svc.deactivate_user(&root(), "a@x.io").await.unwrap();
        let err = svc.login(login("pw")).await.unwrap_err();
        assert!(err.to_string().contains(LOGIN_DISABLED));
        assert!(matches!(
            svc.authenticate(&first.token).await,
            Err(ServiceError::Unauthorized)
        ));

        let uniform = svc.clone().with_uniform_login_errors(true);
        let err = uniform.login(login("pw")).await.unwrap_err();
        assert!(err.to_string().contains(LOGIN_INVALID));
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let err = service()
            .login(LoginRequest {
                email: Some("a@x.io".into()),
                password: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Must include"));
    }

    #[tokio::test]
    async fn unknown_org_type_is_not_found() {
        let svc = service();
        let roles = svc.roles_for("LVL2").unwrap();
        assert_eq!(roles, vec![Role::Lvl2User, Role::Lvl3User]);
        assert!(matches!(svc.roles_for("unknown"), Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn clients_are_platform_admin_only() {
        let svc = service();
        add_client(&svc, "one", OrgType::Lvl1).await;
        svc.create_user(&root(), new_user("lead@x.io", Some("one"), &["LVL1_USER"]))
            .await
            .unwrap();
        let lead = caller_for(&svc, "lead@x.io").await;

        let payload = NewClient {
            name: Some("Acme Corp".into()),
            org_type: Some("lvl2".into()),
            ..NewClient::default()
        };
        assert!(matches!(
            svc.create_client(&lead, payload.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));
        let client = svc.create_client(&root(), payload).await.unwrap();
        assert_eq!(client.org_id, "acme-corp");

        let visible: Vec<String> = svc
            .list_clients(&lead)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.org_id)
            .collect();
        assert_eq!(visible, ["one"]);
    }
}
