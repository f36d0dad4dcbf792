//! Versioned schema migrations for the directory database
//!
//! Each migration runs in its own transaction and is recorded in
//! `directory_schema_version`.

use crate::core_space::errors::SpaceResult;
use crate::core_space::types::Timestamp;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

/// Current schema version
pub const CURRENT_DIRECTORY_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Users, organizations and memberships",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                full_name TEXT NOT NULL DEFAULT '',
                username TEXT NOT NULL UNIQUE,
                tenant_id TEXT UNIQUE,                  -- personal tenant, NULL until provisioned
                api_key TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                visibility TEXT NOT NULL CHECK(visibility IN ('public', 'private')),
                tenant_id TEXT UNIQUE,                  -- NULL until provisioned
                api_key TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS organization_members (
                organization_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('owner', 'admin', 'member', 'viewer')),
                joined_at INTEGER NOT NULL,
                invited_by TEXT,
                title TEXT,
                department TEXT,
                PRIMARY KEY (organization_id, user_id),
                FOREIGN KEY (organization_id) REFERENCES organizations(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_organization_members_user ON organization_members(user_id);
            CREATE INDEX IF NOT EXISTS idx_organization_members_role ON organization_members(organization_id, role);
        "#,
    }]
}

fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> SpaceResult<i32> {
    let conn = pool.get()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS directory_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version = conn
        .query_row(
            "SELECT version FROM directory_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> SpaceResult<()> {
    let current_version = get_current_version(pool)?;
    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get()?;
    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO directory_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis() as i64],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied directory migration"
        );
    }

    Ok(())
}

/// Latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}
