//! Directory stores
//!
//! [`SqlDirectory`] persists users, organizations and memberships in SQLite.
//! [`MemoryDirectory`] keeps them in process memory for tests and fixtures.

pub mod memory_store;
pub mod migrations;
pub mod sql_store;

pub use memory_store::MemoryDirectory;
pub use migrations::{migrate, CURRENT_DIRECTORY_SCHEMA_VERSION};
pub use sql_store::SqlDirectory;
