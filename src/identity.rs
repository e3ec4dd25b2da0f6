use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Group membership that unlocks the admin-only operations.
pub const ADMIN_GROUP: &str = "admin";

/// Verified caller identity, supplied by the transport layer after token
/// verification. `user_id` is the owner id on every record the caller holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Identity {
            user_id: user_id.into(),
            groups: Vec::new(),
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Identity {
            user_id: user_id.into(),
            groups: vec![ADMIN_GROUP.to_string()],
        }
    }

    pub fn is_admin(&self) -> bool {
        self.groups.iter().any(|group| group == ADMIN_GROUP)
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error("unknown user: {0}")]
    UnknownUser(String),
}

/// Administrative surface of the identity provider. The core only needs to
/// force a global sign-out of a named user.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn global_sign_out(&self, username: &str) -> Result<(), IdentityError>;
}

/// In-memory directory for tests and demos. Knows a set of usernames and
/// records every sign-out it performs.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<HashSet<String>>,
    signed_out: RwLock<Vec<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dir = Self::default();
        {
            let mut guard = dir.users.write().expect("directory users lock");
            guard.extend(users.into_iter().map(Into::into));
        }
        dir
    }

    pub fn insert_user(&self, username: impl Into<String>) {
        self.users
            .write()
            .expect("directory users lock")
            .insert(username.into());
    }

    pub fn signed_out(&self) -> Vec<String> {
        self.signed_out
            .read()
            .expect("directory sign-out lock")
            .clone()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn global_sign_out(&self, username: &str) -> Result<(), IdentityError> {
        let known = self
            .users
            .read()
            .expect("directory users lock")
            .contains(username);
        if !known {
            return Err(IdentityError::UnknownUser(username.to_string()));
        }
        self.signed_out
            .write()
            .expect("directory sign-out lock")
            .push(username.to_string());
        Ok(())
    }
}
