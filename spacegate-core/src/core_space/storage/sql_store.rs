//! SQLite-backed identity and organization directory
//!
//! Blocking rusqlite calls run on the tokio blocking pool. Tenant bindings
//! are written with `UPDATE ... WHERE tenant_id IS NULL`, so concurrent
//! binds for the same user or organization settle on a single winner.

use crate::config::StoreConfig;
use crate::core_space::errors::{SpaceError, SpaceResult};
use crate::core_space::organization::{Organization, OrganizationMembership, OrganizationVisibility};
use crate::core_space::role::OrganizationRole;
use crate::core_space::store::{BindOutcome, IdentityStore, OrganizationStore};
use crate::core_space::types::{ApiKey, OrganizationId, TenantBinding, TenantId, Timestamp, UserId};
use crate::core_space::user::User;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::time::Duration;

const ORGANIZATION_COLUMNS: &str =
    "o.id, o.slug, o.name, o.visibility, o.tenant_id, o.api_key, o.created_at, o.updated_at";

const MEMBER_COLUMNS: &str =
    "organization_id, user_id, role, joined_at, invited_by, title, department";

/// Identity and organization store on SQLite
#[derive(Clone)]
pub struct SqlDirectory {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlDirectory {
    /// Wrap an existing pool and run pending migrations
    pub fn new(pool: Pool<SqliteConnectionManager>) -> SpaceResult<Self> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open (creating if needed) the database named in `config`
    pub fn open(config: &StoreConfig) -> SpaceResult<Self> {
        if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SpaceError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let manager = SqliteConnectionManager::file(&config.database_path).with_init(|c| {
            c.busy_timeout(Duration::from_secs(5))?;
            c.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            c.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder().max_size(config.pool_size).build(manager)?;

        tracing::debug!(path = %config.database_path.display(), "Opened directory database");
        Self::new(pool)
    }

    /// Private in-memory database. One connection, so every caller sees the same data.
    pub fn memory() -> SpaceResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::new(pool)
    }

    async fn with_conn<T, F>(&self, f: F) -> SpaceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> SpaceResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| SpaceError::Unavailable(format!("directory task failed: {e}")))?
    }

    /// Register a user. `Conflict` if the id or username is taken.
    pub async fn create_user(&self, user: &User) -> SpaceResult<()> {
        let user = user.clone();
        self.with_conn(move |conn| {
            let (tenant_id, api_key) = binding_columns(user.personal_tenant.as_ref());
            conn.execute(
                "INSERT INTO users (id, email, full_name, username, tenant_id, api_key, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    user.id.as_str(),
                    user.email,
                    user.full_name,
                    user.username,
                    tenant_id,
                    api_key,
                    Timestamp::now().as_millis() as i64,
                ],
            )
            .map_err(|e| constraint_error(e, format!("user {} or username {}", user.id, user.username)))?;
            Ok(())
        })
        .await
    }

    /// All users, oldest first
    pub async fn list_users(&self) -> SpaceResult<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, full_name, username, tenant_id, api_key FROM users ORDER BY rowid",
            )?;
            let users = stmt.query_map([], user_from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
        .await
    }
}

fn binding_columns(binding: Option<&TenantBinding>) -> (Option<String>, Option<String>) {
    match binding {
        Some(b) => (Some(b.tenant_id.to_string()), Some(b.api_key.expose().to_string())),
        None => (None, None),
    }
}

fn binding_from_columns(tenant_id: Option<String>, api_key: Option<String>) -> Option<TenantBinding> {
    match (tenant_id, api_key) {
        (Some(tenant_id), Some(api_key)) => Some(TenantBinding::new(TenantId(tenant_id), ApiKey::new(api_key))),
        _ => None,
    }
}

/// Unique and primary key violations become `Conflict`, foreign key violations `NotFound`
fn constraint_error(e: rusqlite::Error, subject: String) -> SpaceError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = e {
        if failure.code == ErrorCode::ConstraintViolation {
            return match failure.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    SpaceError::NotFound(format!("{subject} references a missing record"))
                }
                _ => SpaceError::Conflict(format!("{subject} already exists")),
            };
        }
    }
    SpaceError::from(e)
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let user = User::new(
        UserId(row.get(0)?),
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
    );
    Ok(match binding_from_columns(row.get(4)?, row.get(5)?) {
        Some(binding) => user.with_personal_tenant(binding),
        None => user,
    })
}

struct OrganizationRow {
    id: String,
    slug: String,
    name: String,
    visibility: String,
    tenant_id: Option<String>,
    api_key: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl OrganizationRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            visibility: row.get(3)?,
            tenant_id: row.get(4)?,
            api_key: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_organization(self) -> SpaceResult<Organization> {
        let visibility = self
            .visibility
            .parse::<OrganizationVisibility>()
            .map_err(|_| SpaceError::Database(format!("organization {} has visibility '{}'", self.id, self.visibility)))?;
        Ok(Organization {
            id: OrganizationId(self.id),
            slug: self.slug,
            name: self.name,
            tenant: binding_from_columns(self.tenant_id, self.api_key),
            visibility,
            created_at: Timestamp::from_millis(self.created_at.max(0) as u64),
            updated_at: Timestamp::from_millis(self.updated_at.max(0) as u64),
        })
    }
}

struct MemberRow {
    organization_id: String,
    user_id: String,
    role: String,
    joined_at: i64,
    invited_by: Option<String>,
    title: Option<String>,
    department: Option<String>,
}

impl MemberRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            organization_id: row.get(0)?,
            user_id: row.get(1)?,
            role: row.get(2)?,
            joined_at: row.get(3)?,
            invited_by: row.get(4)?,
            title: row.get(5)?,
            department: row.get(6)?,
        })
    }

    fn into_membership(self) -> SpaceResult<OrganizationMembership> {
        Ok(OrganizationMembership {
            role: parse_stored_role(&self.role)?,
            organization_id: OrganizationId(self.organization_id),
            user_id: UserId(self.user_id),
            joined_at: Timestamp::from_millis(self.joined_at.max(0) as u64),
            invited_by: self.invited_by.map(UserId),
            title: self.title,
            department: self.department,
        })
    }
}

fn parse_stored_role(raw: &str) -> SpaceResult<OrganizationRole> {
    raw.parse()
        .map_err(|_| SpaceError::Database(format!("stored membership has unknown role '{raw}'")))
}

fn query_organization(conn: &Connection, org_id: &str) -> SpaceResult<Option<Organization>> {
    let row = conn
        .query_row(
            &format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations o WHERE o.id = ?"),
            params![org_id],
            OrganizationRow::from_row,
        )
        .optional()?;
    row.map(OrganizationRow::into_organization).transpose()
}

fn query_role(conn: &Connection, org_id: &str, user_id: &str) -> SpaceResult<Option<OrganizationRole>> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM organization_members WHERE organization_id = ? AND user_id = ?",
            params![org_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    role.as_deref().map(parse_stored_role).transpose()
}

#[async_trait]
impl IdentityStore for SqlDirectory {
    async fn get_user_by_id(&self, user_id: &UserId) -> SpaceResult<User> {
        let id = user_id.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, email, full_name, username, tenant_id, api_key FROM users WHERE id = ?",
                params![id.as_str()],
                user_from_row,
            )
            .optional()?
            .ok_or_else(|| SpaceError::NotFound(format!("user {id}")))
        })
        .await
    }

    async fn update_personal_tenant_info(
        &self,
        user_id: &UserId,
        binding: &TenantBinding,
    ) -> SpaceResult<()> {
        let id = user_id.clone();
        let binding = binding.clone();
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET tenant_id = ?, api_key = ? WHERE id = ?",
                    params![binding.tenant_id.as_str(), binding.api_key.expose(), id.as_str()],
                )
                .map_err(|e| constraint_error(e, format!("tenant {}", binding.tenant_id)))?;
            if updated == 0 {
                return Err(SpaceError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn bind_personal_tenant_if_absent(
        &self,
        user_id: &UserId,
        binding: &TenantBinding,
    ) -> SpaceResult<BindOutcome> {
        let id = user_id.clone();
        let binding = binding.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let updated = tx
                .execute(
                    "UPDATE users SET tenant_id = ?, api_key = ? WHERE id = ? AND tenant_id IS NULL",
                    params![binding.tenant_id.as_str(), binding.api_key.expose(), id.as_str()],
                )
                .map_err(|e| constraint_error(e, format!("tenant {}", binding.tenant_id)))?;

            let outcome = if updated == 1 {
                BindOutcome::Bound
            } else {
                let existing: Option<(Option<String>, Option<String>)> = tx
                    .query_row(
                        "SELECT tenant_id, api_key FROM users WHERE id = ?",
                        params![id.as_str()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let (tenant_id, api_key) =
                    existing.ok_or_else(|| SpaceError::NotFound(format!("user {id}")))?;
                let existing = binding_from_columns(tenant_id, api_key).ok_or_else(|| {
                    SpaceError::Database(format!("user {id} has a tenant id without an api key"))
                })?;
                BindOutcome::AlreadyBound(existing)
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }
}

#[async_trait]
impl OrganizationStore for SqlDirectory {
    async fn get_organization(
        &self,
        org_id: &OrganizationId,
        _caller_id: &UserId,
    ) -> SpaceResult<Organization> {
        let id = org_id.clone();
        self.with_conn(move |conn| {
            query_organization(conn, id.as_str())?
                .ok_or_else(|| SpaceError::NotFound(format!("organization {id}")))
        })
        .await
    }

    async fn get_organization_members(
        &self,
        org_id: &OrganizationId,
        caller_id: &UserId,
    ) -> SpaceResult<Vec<OrganizationMembership>> {
        let id = org_id.clone();
        let caller = caller_id.clone();
        self.with_conn(move |conn| {
            if query_organization(conn, id.as_str())?.is_none() {
                return Err(SpaceError::NotFound(format!("organization {id}")));
            }
            if query_role(conn, id.as_str(), caller.as_str())?.is_none() {
                return Err(SpaceError::Forbidden(format!("user {caller} is not a member of {id}")));
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMBER_COLUMNS} FROM organization_members WHERE organization_id = ? ORDER BY rowid"
            ))?;
            let rows = stmt
                .query_map(params![id.as_str()], MemberRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(MemberRow::into_membership).collect()
        })
        .await
    }

    async fn membership_role(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> SpaceResult<Option<OrganizationRole>> {
        let (org, user) = (org_id.clone(), user_id.clone());
        self.with_conn(move |conn| query_role(conn, org.as_str(), user.as_str())).await
    }

    async fn list_user_organizations(&self, user_id: &UserId) -> SpaceResult<Vec<Organization>> {
        let user = user_id.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ORGANIZATION_COLUMNS} FROM organizations o
                 JOIN organization_members m ON m.organization_id = o.id
                 WHERE m.user_id = ? ORDER BY o.rowid"
            ))?;
            let rows = stmt
                .query_map(params![user.as_str()], OrganizationRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(OrganizationRow::into_organization).collect()
        })
        .await
    }

    async fn create_organization(
        &self,
        org: &Organization,
        owner: &OrganizationMembership,
    ) -> SpaceResult<()> {
        let org = org.clone();
        let owner = owner.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let (tenant_id, api_key) = binding_columns(org.tenant.as_ref());
            tx.execute(
                "INSERT INTO organizations (id, slug, name, visibility, tenant_id, api_key, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    org.id.as_str(),
                    org.slug,
                    org.name,
                    org.visibility.as_str(),
                    tenant_id,
                    api_key,
                    org.created_at.as_millis() as i64,
                    org.updated_at.as_millis() as i64,
                ],
            )
            .map_err(|e| constraint_error(e, format!("organization slug '{}'", org.slug)))?;
            insert_member(&tx, &owner)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn update_organization(&self, org: &Organization) -> SpaceResult<()> {
        let org = org.clone();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE organizations SET name = ?, visibility = ?, updated_at = ? WHERE id = ?",
                params![
                    org.name,
                    org.visibility.as_str(),
                    org.updated_at.as_millis() as i64,
                    org.id.as_str()
                ],
            )?;
            if updated == 0 {
                return Err(SpaceError::NotFound(format!("organization {}", org.id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_organization(&self, org_id: &OrganizationId) -> SpaceResult<()> {
        let id = org_id.clone();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM organizations WHERE id = ?", params![id.as_str()])?;
            if deleted == 0 {
                return Err(SpaceError::NotFound(format!("organization {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn add_member(&self, membership: &OrganizationMembership) -> SpaceResult<()> {
        let membership = membership.clone();
        self.with_conn(move |conn| insert_member(conn, &membership)).await
    }

    async fn set_member_role_keeping_owner(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
        role: OrganizationRole,
    ) -> SpaceResult<()> {
        let (org, user) = (org_id.clone(), user_id.clone());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let updated = tx.execute(
                "UPDATE organization_members SET role = ?1
                 WHERE organization_id = ?2 AND user_id = ?3
                   AND (role <> 'owner' OR ?1 = 'owner' OR (
                       SELECT COUNT(*) FROM organization_members
                       WHERE organization_id = ?2 AND role = 'owner') > 1)",
                params![role.as_str(), org.as_str(), user.as_str()],
            )?;
            if updated == 0 {
                return Err(owner_guard_error(&tx, &org, &user));
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove_member_keeping_owner(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> SpaceResult<()> {
        let (org, user) = (org_id.clone(), user_id.clone());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let deleted = tx.execute(
                "DELETE FROM organization_members
                 WHERE organization_id = ?1 AND user_id = ?2
                   AND (role <> 'owner' OR (
                       SELECT COUNT(*) FROM organization_members
                       WHERE organization_id = ?1 AND role = 'owner') > 1)",
                params![org.as_str(), user.as_str()],
            )?;
            if deleted == 0 {
                return Err(owner_guard_error(&tx, &org, &user));
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn bind_organization_tenant_if_absent(
        &self,
        org_id: &OrganizationId,
        binding: &TenantBinding,
    ) -> SpaceResult<BindOutcome> {
        let id = org_id.clone();
        let binding = binding.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let updated = tx
                .execute(
                    "UPDATE organizations SET tenant_id = ?, api_key = ?, updated_at = ?
                     WHERE id = ? AND tenant_id IS NULL",
                    params![
                        binding.tenant_id.as_str(),
                        binding.api_key.expose(),
                        Timestamp::now().as_millis() as i64,
                        id.as_str()
                    ],
                )
                .map_err(|e| constraint_error(e, format!("tenant {}", binding.tenant_id)))?;

            let outcome = if updated == 1 {
                BindOutcome::Bound
            } else {
                let org = query_organization(&tx, id.as_str())?
                    .ok_or_else(|| SpaceError::NotFound(format!("organization {id}")))?;
                let existing = org.tenant.ok_or_else(|| {
                    SpaceError::Database(format!("organization {id} has a tenant id without an api key"))
                })?;
                BindOutcome::AlreadyBound(existing)
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }
}

/// Why a guarded membership write touched no row: no such member, or the last owner
fn owner_guard_error(conn: &Connection, org: &OrganizationId, user: &UserId) -> SpaceError {
    match query_role(conn, org.as_str(), user.as_str()) {
        Ok(Some(_)) => SpaceError::Conflict(format!("organization {org} must keep an owner")),
        Ok(None) => SpaceError::NotFound(format!("user {user} is not a member of {org}")),
        Err(e) => e,
    }
}

fn insert_member(conn: &Connection, membership: &OrganizationMembership) -> SpaceResult<()> {
    conn.execute(
        &format!("INSERT INTO organization_members ({MEMBER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
        params![
            membership.organization_id.as_str(),
            membership.user_id.as_str(),
            membership.role.as_str(),
            membership.joined_at.as_millis() as i64,
            membership.invited_by.as_ref().map(UserId::as_str),
            membership.title,
            membership.department,
        ],
    )
    .map_err(|e| {
        constraint_error(
            e,
            format!("membership of {} in {}", membership.user_id, membership.organization_id),
        )
    })?;
    Ok(())
}
