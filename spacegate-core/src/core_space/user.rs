//! Identity-store user record

use super::types::{TenantBinding, UserId};

/// A user as returned by the identity store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub username: String,

    /// Present only once a personal tenant has been provisioned
    pub personal_tenant: Option<TenantBinding>,
}

impl User {
    pub fn new(
        id: UserId,
        email: impl Into<String>,
        full_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            full_name: full_name.into(),
            username: username.into(),
            personal_tenant: None,
        }
    }

    pub fn with_personal_tenant(mut self, binding: TenantBinding) -> Self {
        self.personal_tenant = Some(binding);
        self
    }

    /// Full name, or the username when no full name is on record
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}
