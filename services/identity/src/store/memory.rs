//! In-memory identity store
//!
//! Everything lives in ordered maps behind one `tokio::sync::RwLock`. Reads
//! share the lock; every mutation takes the write lock, works on a copy of the
//! affected row and only writes it back once the hook has accepted it, so a
//! rejected change leaves no trace. State is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    ClientHook, EmployeeHook, IdentityStore, SeedBatch, SeedOutcome, StoreError, StoreResult,
    UserHook, client_in_use, client_not_found, employee_not_found, unknown_client,
    user_not_found,
};
use crate::models::{Client, Employee, Timestamps, User};

#[derive(Debug, Clone, Default)]
struct State {
    clients: BTreeMap<String, Client>,
    /// Keyed by email, which never changes after creation.
    users: BTreeMap<String, User>,
    user_emails: HashMap<i64, String>,
    employees: BTreeMap<String, Employee>,
    /// Token key -> user id
    tokens: HashMap<String, i64>,
    next_user_id: i64,
    next_employee_id: i64,
}

impl State {
    fn insert_client(&mut self, mut client: Client, now: DateTime<Utc>) -> StoreResult<Client> {
        if self.clients.contains_key(&client.org_id) {
            return Err(StoreError::Duplicate {
                entity: "client",
                field: "org_id",
            });
        }
        client.timestamps = Timestamps::inserted_at(now);
        self.clients.insert(client.org_id.clone(), client.clone());
        Ok(client)
    }

    fn insert_user(
        &mut self,
        mut user: User,
        hook: UserHook,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        if self.users.contains_key(&user.email) {
            return Err(StoreError::Duplicate {
                entity: "user",
                field: "email",
            });
        }
        let client = self.resolve_client(user.client.as_deref())?;
        hook(&mut user, client)?;
        // The hook may have moved the user to another tenant.
        self.resolve_client(user.client.as_deref())?;

        self.next_user_id += 1;
        user.id = self.next_user_id;
        user.timestamps = Timestamps::inserted_at(now);
        self.user_emails.insert(user.id, user.email.clone());
        self.users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    fn resolve_client(&self, org_id: Option<&str>) -> StoreResult<Option<&Client>> {
        match org_id {
            None => Ok(None),
            Some(org_id) => self
                .clients
                .get(org_id)
                .map(Some)
                .ok_or_else(|| unknown_client(org_id).into()),
        }
    }

    fn user_by_id(&self, id: i64) -> Option<&User> {
        self.user_emails
            .get(&id)
            .and_then(|email| self.users.get(email))
    }
}

/// Identity store kept entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let state = self.state.read().await;
        Ok(state.clients.values().cloned().collect())
    }

    async fn get_client(&self, org_id: &str) -> StoreResult<Option<Client>> {
        let state = self.state.read().await;
        Ok(state.clients.get(org_id).cloned())
    }

    async fn insert_client(&self, client: Client) -> StoreResult<Client> {
        let mut state = self.state.write().await;
        state.insert_client(client, Utc::now())
    }

    async fn update_client(&self, org_id: &str, hook: ClientHook) -> StoreResult<Client> {
        let mut state = self.state.write().await;
        let mut client = state
            .clients
            .get(org_id)
            .cloned()
            .ok_or_else(|| client_not_found(org_id))?;
        let members: Vec<User> = state
            .users
            .values()
            .filter(|user| user.client.as_deref() == Some(org_id))
            .cloned()
            .collect();

        hook(&mut client, &members)?;
        client.org_id = org_id.to_string();
        client.timestamps.touch(Utc::now());
        state.clients.insert(client.org_id.clone(), client.clone());
        Ok(client)
    }

    async fn delete_client(&self, org_id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.clients.contains_key(org_id) {
            return Err(client_not_found(org_id));
        }
        let members = state
            .users
            .values()
            .filter(|user| user.client.as_deref() == Some(org_id))
            .count();
        if members > 0 {
            return Err(client_in_use(org_id, members).into());
        }
        state.clients.remove(org_id);
        Ok(())
    }

    async fn list_users(&self, client: Option<&str>) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|user| client.is_none_or(|org_id| user.client.as_deref() == Some(org_id)))
            .cloned()
            .collect())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(email).cloned())
    }

    async fn insert_user(&self, user: User, hook: UserHook) -> StoreResult<User> {
        let mut state = self.state.write().await;
        state.insert_user(user, hook, Utc::now())
    }

    async fn update_user(&self, email: &str, hook: UserHook) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let mut user = state
            .users
            .get(email)
            .cloned()
            .ok_or_else(|| user_not_found(email))?;

        let client = state.resolve_client(user.client.as_deref())?;
        hook(&mut user, client)?;
        state.resolve_client(user.client.as_deref())?;

        user.email = email.to_string();
        user.timestamps.touch(Utc::now());
        state.users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn list_employees(&self) -> StoreResult<Vec<Employee>> {
        let state = self.state.read().await;
        Ok(state.employees.values().cloned().collect())
    }

    async fn get_employee_by_email(&self, email: &str) -> StoreResult<Option<Employee>> {
        let state = self.state.read().await;
        Ok(state.employees.get(email).cloned())
    }

    async fn insert_employee(&self, mut employee: Employee) -> StoreResult<Employee> {
        let mut state = self.state.write().await;
        if state.employees.contains_key(&employee.email) {
            return Err(StoreError::Duplicate {
                entity: "employee",
                field: "email",
            });
        }
        state.next_employee_id += 1;
        employee.id = state.next_employee_id;
        employee.timestamps = Timestamps::inserted_at(Utc::now());
        state
            .employees
            .insert(employee.email.clone(), employee.clone());
        Ok(employee)
    }

    async fn update_employee(&self, email: &str, hook: EmployeeHook) -> StoreResult<Employee> {
        let mut state = self.state.write().await;
        let mut employee = state
            .employees
            .get(email)
            .cloned()
            .ok_or_else(|| employee_not_found(email))?;

        hook(&mut employee)?;
        employee.email = email.to_string();
        employee.timestamps.touch(Utc::now());
        state
            .employees
            .insert(employee.email.clone(), employee.clone());
        Ok(employee)
    }

    async fn issue_token(
        &self,
        user_id: i64,
        candidate_key: String,
        at: DateTime<Utc>,
    ) -> StoreResult<String> {
        let mut state = self.state.write().await;
        let email = state
            .user_emails
            .get(&user_id)
            .cloned()
            .ok_or_else(|| user_not_found(&user_id.to_string()))?;

        let existing = state
            .tokens
            .iter()
            .find(|(_, owner)| **owner == user_id)
            .map(|(key, _)| key.clone());
        let key = match existing {
            Some(key) => key,
            None => {
                state.tokens.insert(candidate_key.clone(), user_id);
                candidate_key
            }
        };

        if let Some(user) = state.users.get_mut(&email) {
            user.last_login = Some(at);
        }
        Ok(key)
    }

    async fn user_for_token(&self, key: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .tokens
            .get(key)
            .and_then(|id| state.user_by_id(*id))
            .cloned())
    }

    async fn revoke_token(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.tokens.remove(key).is_some())
    }

    async fn seed(&self, batch: SeedBatch) -> StoreResult<SeedOutcome> {
        let mut state = self.state.write().await;
        if batch
            .clients
            .iter()
            .any(|client| state.clients.contains_key(&client.org_id))
        {
            return Ok(SeedOutcome::Skipped);
        }

        // Stage on a copy so a failure part way leaves the live state untouched.
        let mut staged = state.clone();
        let now = Utc::now();
        let clients = batch.clients.len();
        let users = batch.users.len();
        for client in batch.clients {
            staged.insert_client(client, now)?;
        }
        for user in batch.users {
            staged.insert_user(user, Box::new(|_, _| Ok(())), now)?;
        }
        *state = staged;
        Ok(SeedOutcome::Applied { clients, users })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
