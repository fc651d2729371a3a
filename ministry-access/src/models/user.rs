//! User profile document - server-side role and role history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Role, RoleChange};
use crate::services::Document;

/// Stored in `users` keyed by `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub role_history: Vec<RoleChange>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: String, role: Role) -> Self {
        Self {
            user_id,
            role,
            role_history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Append `change` to the history and adopt its new role.
    pub fn apply_upgrade(&mut self, change: RoleChange) {
        self.role = change.new_role;
        self.updated_at = change.upgrade_date;
        self.role_history.push(change);
    }
}

impl Document for UserProfile {
    const COLLECTION: &'static str = "users";

    fn document_id(&self) -> &str {
        &self.user_id
    }
}
