//! Postgres-backed identity store
//!
//! Every mutation runs in its own SERIALIZABLE transaction: the current row
//! is locked, the hook runs against it, and the result is written back before
//! commit. Uniqueness is checked inside the transaction so the common case
//! reports a clean duplicate error; a constraint violation or serialization
//! failure raised by a concurrent writer surfaces as [`StoreError::Conflict`].
//!
//! Roles live in `user_roles` and are loaded in one batch per listing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    ClientHook, EmployeeHook, IdentityStore, SeedBatch, SeedOutcome, StoreError, StoreResult,
    UserHook, client_in_use, client_not_found, employee_not_found, unknown_client,
    user_not_found,
};
use crate::models::{Client, Employee, ParseEnumError, Role, Timestamps, User};

const CLIENT_COLUMNS: &str = "org_id, name, address, phone, org_type, created, modified";

const USER_COLUMNS: &str = "u.id, u.email, u.password_hash, u.first_name, u.last_name, u.phone, \
     u.status, u.is_active, u.is_staff, u.is_superuser, u.client_id, u.date_joined, u.last_login, \
     u.created, u.modified";

const EMPLOYEE_COLUMNS: &str = "id, email, first_name, last_name, role, phone, status, \
     is_active, date_from, date_to, created, modified";

/// SQLSTATE codes raised when a concurrent writer got there first
const CONFLICT_CODES: [&str; 4] = ["23505", "23503", "40001", "40P01"];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err
                .code()
                .is_some_and(|code| CONFLICT_CODES.iter().any(|c| *c == code))
            {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Unexpected(err.into())
    }
}

/// Identity store backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> DatabaseResult<()> {
        info!("Running identity schema migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

fn parse_column<T>(raw: String) -> StoreResult<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse()
        .map_err(|e: ParseEnumError| StoreError::Unexpected(anyhow::anyhow!("corrupt row: {}", e)))
}

fn client_from_row(row: &PgRow) -> StoreResult<Client> {
    Ok(Client {
        org_id: row.get("org_id"),
        name: row.get("name"),
        address: row.get("address"),
        phone: row.get("phone"),
        org_type: parse_column(row.get("org_type"))?,
        timestamps: Timestamps {
            created: row.get("created"),
            modified: row.get("modified"),
        },
    })
}

fn user_from_row(row: &PgRow, roles: Vec<Role>) -> StoreResult<User> {
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone: row.get("phone"),
        status: parse_column(row.get("status"))?,
        is_active: row.get("is_active"),
        is_staff: row.get("is_staff"),
        is_superuser: row.get("is_superuser"),
        client: row.get("client_id"),
        roles,
        date_joined: row.get("date_joined"),
        last_login: row.get("last_login"),
        timestamps: Timestamps {
            created: row.get("created"),
            modified: row.get("modified"),
        },
    })
}

fn employee_from_row(row: &PgRow) -> StoreResult<Employee> {
    Ok(Employee {
        id: row.get("id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        role: row.get("role"),
        phone: row.get("phone"),
        status: parse_column(row.get("status"))?,
        is_active: row.get("is_active"),
        date_from: row.get("date_from"),
        date_to: row.get("date_to"),
        timestamps: Timestamps {
            created: row.get("created"),
            modified: row.get("modified"),
        },
    })
}

async fn fetch_client(
    conn: &mut PgConnection,
    org_id: &str,
    lock: bool,
) -> StoreResult<Option<Client>> {
    let sql = format!(
        "SELECT {} FROM clients WHERE org_id = $1{}",
        CLIENT_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(org_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(client_from_row).transpose()
}

async fn load_roles(
    conn: &mut PgConnection,
    user_ids: &[i64],
) -> StoreResult<HashMap<i64, Vec<Role>>> {
    let rows = sqlx::query(
        r#"
        SELECT user_id, role_name
        FROM user_roles
        WHERE user_id = ANY($1)
        ORDER BY user_id, role_name
        "#,
    )
    .bind(user_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut roles: HashMap<i64, Vec<Role>> = HashMap::new();
    for row in rows {
        let role = parse_column(row.get("role_name"))?;
        roles.entry(row.get("user_id")).or_default().push(role);
    }
    Ok(roles)
}

async fn users_from_rows(conn: &mut PgConnection, rows: Vec<PgRow>) -> StoreResult<Vec<User>> {
    let ids: Vec<i64> = rows.iter().map(|row| row.get("id")).collect();
    let mut roles = load_roles(conn, &ids).await?;
    rows.iter()
        .map(|row| {
            let id: i64 = row.get("id");
            let mut user = user_from_row(row, Vec::new())?;
            user.set_roles(roles.remove(&id).unwrap_or_default());
            Ok(user)
        })
        .collect()
}

async fn fetch_user(
    conn: &mut PgConnection,
    email: &str,
    lock: bool,
) -> StoreResult<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users u WHERE u.email = $1{}",
        USER_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );
    let rows = sqlx::query(&sql)
        .bind(email)
        .fetch_all(&mut *conn)
        .await?;
    Ok(users_from_rows(conn, rows).await?.into_iter().next())
}

async fn resolve_client(
    conn: &mut PgConnection,
    org_id: Option<&str>,
) -> StoreResult<Option<Client>> {
    match org_id {
        None => Ok(None),
        Some(org_id) => fetch_client(conn, org_id, false)
            .await?
            .map(Some)
            .ok_or_else(|| unknown_client(org_id).into()),
    }
}

async fn write_roles(conn: &mut PgConnection, user: &User) -> StoreResult<()> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user.id)
        .execute(&mut *conn)
        .await?;
    let names: Vec<String> = user.roles.iter().map(|r| r.as_str().to_string()).collect();
    sqlx::query("INSERT INTO user_roles (user_id, role_name) SELECT $1, UNNEST($2::text[])")
        .bind(user.id)
        .bind(&names)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_client_row(
    conn: &mut PgConnection,
    mut client: Client,
    now: DateTime<Utc>,
) -> StoreResult<Client> {
    if fetch_client(conn, &client.org_id, false).await?.is_some() {
        return Err(StoreError::Duplicate {
            entity: "client",
            field: "org_id",
        });
    }
    client.timestamps = Timestamps::inserted_at(now);
    sqlx::query(
        r#"
        INSERT INTO clients (org_id, name, address, phone, org_type, created, modified)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&client.org_id)
    .bind(&client.name)
    .bind(&client.address)
    .bind(&client.phone)
    .bind(client.org_type.as_str())
    .bind(client.timestamps.created)
    .bind(client.timestamps.modified)
    .execute(&mut *conn)
    .await?;
    Ok(client)
}

async fn insert_user_row(
    conn: &mut PgConnection,
    mut user: User,
    hook: UserHook,
    now: DateTime<Utc>,
) -> StoreResult<User> {
    let taken = sqlx::query("SELECT 1 FROM users WHERE email = $1")
        .bind(&user.email)
        .fetch_optional(&mut *conn)
        .await?;
    if taken.is_some() {
        return Err(StoreError::Duplicate {
            entity: "user",
            field: "email",
        });
    }

    let client = resolve_client(conn, user.client.as_deref()).await?;
    hook(&mut user, client.as_ref())?;
    if user.client.as_deref() != client.as_ref().map(|c| c.org_id.as_str()) {
        resolve_client(conn, user.client.as_deref()).await?;
    }

    user.timestamps = Timestamps::inserted_at(now);
    let row = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, phone, status,
                           is_active, is_staff, is_superuser, client_id, date_joined,
                           last_login, created, modified)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id
        "#,
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.phone)
    .bind(user.status.as_str())
    .bind(user.is_active)
    .bind(user.is_staff)
    .bind(user.is_superuser)
    .bind(&user.client)
    .bind(user.date_joined)
    .bind(user.last_login)
    .bind(user.timestamps.created)
    .bind(user.timestamps.modified)
    .fetch_one(&mut *conn)
    .await?;
    user.id = row.get("id");

    write_roles(conn, &user).await?;
    Ok(user)
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let sql = format!("SELECT {} FROM clients ORDER BY org_id", CLIENT_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(client_from_row).collect()
    }

    async fn get_client(&self, org_id: &str) -> StoreResult<Option<Client>> {
        let mut conn = self.pool.acquire().await?;
        fetch_client(&mut conn, org_id, false).await
    }

    async fn insert_client(&self, client: Client) -> StoreResult<Client> {
        debug!(org_id = %client.org_id, "Inserting client");
        let mut tx = self.begin().await?;
        let client = insert_client_row(&mut tx, client, Utc::now()).await?;
        tx.commit().await?;
        Ok(client)
    }

    async fn update_client(&self, org_id: &str, hook: ClientHook) -> StoreResult<Client> {
        let mut tx = self.begin().await?;
        let mut client = fetch_client(&mut tx, org_id, true)
            .await?
            .ok_or_else(|| client_not_found(org_id))?;
        let sql = format!(
            "SELECT {} FROM users u WHERE u.client_id = $1 ORDER BY u.email FOR UPDATE",
            USER_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(org_id).fetch_all(&mut *tx).await?;
        let members = users_from_rows(&mut tx, rows).await?;

        hook(&mut client, &members)?;
        client.timestamps.touch(Utc::now());
        sqlx::query(
            r#"
            UPDATE clients
            SET name = $2, address = $3, phone = $4, org_type = $5, modified = $6
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .bind(&client.name)
        .bind(&client.address)
        .bind(&client.phone)
        .bind(client.org_type.as_str())
        .bind(client.timestamps.modified)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        client.org_id = org_id.to_string();
        Ok(client)
    }

    async fn delete_client(&self, org_id: &str) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        if fetch_client(&mut tx, org_id, true).await?.is_none() {
            return Err(client_not_found(org_id));
        }
        let members: i64 = sqlx::query("SELECT COUNT(*) AS n FROM users WHERE client_id = $1")
            .bind(org_id)
            .fetch_one(&mut *tx)
            .await?
            .get("n");
        if members > 0 {
            return Err(client_in_use(org_id, members as usize).into());
        }
        sqlx::query("DELETE FROM clients WHERE org_id = $1")
            .bind(org_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_users(&self, client: Option<&str>) -> StoreResult<Vec<User>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM users u WHERE ($1::varchar IS NULL OR u.client_id = $1) ORDER BY u.email",
            USER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(client)
            .fetch_all(&mut *conn)
            .await?;
        users_from_rows(&mut conn, rows).await
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, email, false).await
    }

    async fn insert_user(&self, user: User, hook: UserHook) -> StoreResult<User> {
        debug!(email = %user.email, "Inserting user");
        let mut tx = self.begin().await?;
        let user = insert_user_row(&mut tx, user, hook, Utc::now()).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn update_user(&self, email: &str, hook: UserHook) -> StoreResult<User> {
        let mut tx = self.begin().await?;
        let mut user = fetch_user(&mut tx, email, true)
            .await?
            .ok_or_else(|| user_not_found(email))?;

        let client = resolve_client(&mut tx, user.client.as_deref()).await?;
        hook(&mut user, client.as_ref())?;
        if user.client.as_deref() != client.as_ref().map(|c| c.org_id.as_str()) {
            resolve_client(&mut tx, user.client.as_deref()).await?;
        }

        user.email = email.to_string();
        user.timestamps.touch(Utc::now());
        sqlx::query(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, phone = $4, status = $5, is_active = $6,
                is_staff = $7, is_superuser = $8, client_id = $9, password_hash = $10,
                modified = $11
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(user.status.as_str())
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(&user.client)
        .bind(&user.password_hash)
        .bind(user.timestamps.modified)
        .execute(&mut *tx)
        .await?;
        write_roles(&mut tx, &user).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn list_employees(&self) -> StoreResult<Vec<Employee>> {
        let sql = format!("SELECT {} FROM employees ORDER BY email", EMPLOYEE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(employee_from_row).collect()
    }

    async fn get_employee_by_email(&self, email: &str) -> StoreResult<Option<Employee>> {
        let sql = format!("SELECT {} FROM employees WHERE email = $1", EMPLOYEE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(employee_from_row).transpose()
    }

    async fn insert_employee(&self, mut employee: Employee) -> StoreResult<Employee> {
        let mut tx = self.begin().await?;
        let taken = sqlx::query("SELECT 1 FROM employees WHERE email = $1")
            .bind(&employee.email)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(StoreError::Duplicate {
                entity: "employee",
                field: "email",
            });
        }

        employee.timestamps = Timestamps::inserted_at(Utc::now());
        let row = sqlx::query(
            r#"
            INSERT INTO employees (email, first_name, last_name, role, phone, status,
                                   is_active, date_from, date_to, created, modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&employee.email)
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(&employee.role)
        .bind(&employee.phone)
        .bind(employee.status.as_str())
        .bind(employee.is_active)
        .bind(employee.date_from)
        .bind(employee.date_to)
        .bind(employee.timestamps.created)
        .bind(employee.timestamps.modified)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        employee.id = row.get("id");
        Ok(employee)
    }

    async fn update_employee(&self, email: &str, hook: EmployeeHook) -> StoreResult<Employee> {
        let mut tx = self.begin().await?;
        let sql = format!(
            "SELECT {} FROM employees WHERE email = $1 FOR UPDATE",
            EMPLOYEE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| employee_not_found(email))?;
        let mut employee = employee_from_row(&row)?;

        hook(&mut employee)?;
        employee.email = email.to_string();
        employee.timestamps.touch(Utc::now());
        sqlx::query(
            r#"
            UPDATE employees
            SET first_name = $2, last_name = $3, role = $4, phone = $5, status = $6,
                is_active = $7, date_from = $8, date_to = $9, modified = $10
            WHERE id = $1
            "#,
        )
        .bind(employee.id)
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(&employee.role)
        .bind(&employee.phone)
        .bind(employee.status.as_str())
        .bind(employee.is_active)
        .bind(employee.date_from)
        .bind(employee.date_to)
        .bind(employee.timestamps.modified)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(employee)
    }

    async fn issue_token(
        &self,
        user_id: i64,
        candidate_key: String,
        at: DateTime<Utc>,
    ) -> StoreResult<String> {
        let mut tx = self.begin().await?;
        let stamped = sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        if stamped.rows_affected() == 0 {
            return Err(user_not_found(&user_id.to_string()));
        }

        let existing = sqlx::query("SELECT key FROM auth_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let key = match existing {
            Some(row) => row.get("key"),
            None => {
                sqlx::query("INSERT INTO auth_tokens (key, user_id, created) VALUES ($1, $2, $3)")
                    .bind(&candidate_key)
                    .bind(user_id)
                    .bind(at)
                    .execute(&mut *tx)
                    .await?;
                candidate_key
            }
        };
        tx.commit().await?;
        Ok(key)
    }

    async fn user_for_token(&self, key: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM users u JOIN auth_tokens t ON t.user_id = u.id WHERE t.key = $1",
            USER_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(key).fetch_all(&mut *conn).await?;
        Ok(users_from_rows(&mut conn, rows).await?.into_iter().next())
    }

    async fn revoke_token(&self, key: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn seed(&self, batch: SeedBatch) -> StoreResult<SeedOutcome> {
        let mut tx = self.begin().await?;
        let org_ids: Vec<String> = batch.clients.iter().map(|c| c.org_id.clone()).collect();
        let existing: i64 = sqlx::query("SELECT COUNT(*) AS n FROM clients WHERE org_id = ANY($1)")
            .bind(&org_ids)
            .fetch_one(&mut *tx)
            .await?
            .get("n");
        if existing > 0 {
            return Ok(SeedOutcome::Skipped);
        }

        let now = Utc::now();
        let clients = batch.clients.len();
        let users = batch.users.len();
        for client in batch.clients {
            insert_client_row(&mut tx, client, now).await?;
        }
        for user in batch.users {
            insert_user_row(&mut tx, user, Box::new(|_, _| Ok(())), now).await?;
        }
        tx.commit().await?;
        Ok(SeedOutcome::Applied { clients, users })
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
