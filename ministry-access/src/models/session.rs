//! Session model - the one signed-in user of this installation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{DeviceFingerprint, Role, RoleChange};

/// Identity snapshot, taken from the identity provider or typed in on
/// invite activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserInfo {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 100))]
    pub campus: String,
    #[validate(email)]
    pub email: String,
}

/// Persisted current-user session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub is_authenticated: bool,
    pub identity: UserInfo,
    pub role: Role,
    pub bound_device: DeviceFingerprint,
    /// Invite code the session was created from; `None` for provider logins.
    #[serde(default)]
    pub source_invite_code: Option<String>,
    pub authenticated_at: DateTime<Utc>,
    #[serde(default)]
    pub role_history: Vec<RoleChange>,
}

impl UserSession {
    pub fn new(
        identity: UserInfo,
        role: Role,
        bound_device: DeviceFingerprint,
        source_invite_code: Option<String>,
    ) -> Self {
        Self {
            is_authenticated: true,
            identity,
            role,
            bound_device,
            source_invite_code,
            authenticated_at: Utc::now(),
            role_history: Vec::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn is_sourced_from(&self, code: &str) -> bool {
        self.source_invite_code.as_deref() == Some(code)
    }
}
