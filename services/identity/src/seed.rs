//! Bootstrap data for a fresh deployment
//!
//! One client per organization type and one user per role. Each user's
//! password is the local part of its email address, so this must never run
//! against a production database.

use tracing::info;

use crate::access::clean_user;
use crate::credentials::hash_password;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Client, OrgType, Role, Timestamps, User};
use crate::roles::RoleRegistry;
use crate::store::{IdentityStore, SeedBatch, SeedOutcome};

/// (name, org_id, organization type)
pub const SEED_CLIENTS: [(&str, &str, OrgType); 4] = [
    ("Administrators", "admin", OrgType::Admin),
    ("Client 1", "client1", OrgType::Lvl1),
    ("Client 2", "client2", OrgType::Lvl2),
    ("Client 3", "client3", OrgType::Lvl3),
];

/// (email local part, role, owning org_id)
pub const SEED_USERS: [(&str, Role, &str); 4] = [
    ("admin", Role::Admin, "admin"),
    ("lvl1", Role::Lvl1User, "client1"),
    ("lvl2", Role::Lvl2User, "client2"),
    ("lvl3", Role::Lvl3User, "client3"),
];

/// Build the seed batch for `email_domain`, running the same role and
/// admin-flag checks as the regular create path.
pub fn build_batch(registry: &RoleRegistry, email_domain: &str) -> ServiceResult<SeedBatch> {
    let clients: Vec<Client> = SEED_CLIENTS
        .iter()
        .map(|(name, org_id, org_type)| Client {
            org_id: org_id.to_string(),
            name: name.to_string(),
            address: String::new(),
            phone: String::new(),
            org_type: *org_type,
            timestamps: Timestamps::default(),
        })
        .collect();

    let mut users = Vec::with_capacity(SEED_USERS.len());
    for (local, role, org_id) in SEED_USERS {
        let password_hash =
            hash_password(local).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let mut user = User::new(&format!("{}@{}", local, email_domain), password_hash);
        user.client = Some(org_id.to_string());
        user.set_roles([role]);

        let org_type = clients
            .iter()
            .find(|c| c.org_id == org_id)
            .map(|c| c.org_type);
        registry.validate_assignment(org_type, &user.roles)?;
        clean_user(&mut user);
        users.push(user);
    }

    Ok(SeedBatch { clients, users })
}

/// Apply the seed batch in one unit of work. Skipped when the seed clients
/// already exist.
pub async fn run(
    store: &dyn IdentityStore,
    registry: &RoleRegistry,
    email_domain: &str,
) -> ServiceResult<SeedOutcome> {
    let batch = build_batch(registry, email_domain)?;
    let outcome = store.seed(batch).await?;
    match outcome {
        SeedOutcome::Applied { clients, users } => {
            info!(clients, users, "Seeded bootstrap clients and users")
        }
        SeedOutcome::Skipped => info!("Seed data already present, skipping"),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::verify_password;
    use crate::store::MemoryStore;

    #[test]
    fn batch_has_one_client_per_org_type_and_one_user_per_role() {
        let batch = build_batch(&RoleRegistry::standard(), "example.com").unwrap();

        let types: Vec<OrgType> = batch.clients.iter().map(|c| c.org_type).collect();
        assert_eq!(types, OrgType::ALL);

        let admin = &batch.users[0];
        assert_eq!(admin.email, "admin@example.com");
        assert!(admin.is_staff && admin.is_superuser);
        assert!(verify_password("admin", &admin.password_hash));

        let lvl3 = &batch.users[3];
        assert_eq!(lvl3.client.as_deref(), Some("client3"));
        assert_eq!(lvl3.roles, vec![Role::Lvl3User]);
        assert!(!lvl3.is_staff);
    }

    #[tokio::test]
    async fn seeding_twice_is_a_no_op() {
        let store = MemoryStore::new();
        let registry = RoleRegistry::standard();

        let first = run(&store, &registry, "corp.test").await.unwrap();
        assert_eq!(first, SeedOutcome::Applied { clients: 4, users: 4 });
        let second = run(&store, &registry, "corp.test").await.unwrap();
        assert_eq!(second, SeedOutcome::Skipped);

        let users = store.list_users(Some("client1")).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "lvl1@corp.test");
    }
}
