//! The single current-user session of this installation.
//!
//! The session is cached in the local key-value store so it survives
//! restarts. Only this module writes it.

use std::sync::Arc;
use validator::Validate;

use crate::models::{InviteCode, Role, RoleChange, UserInfo, UserSession};

use super::device::DeviceFingerprintService;
use super::document_store::DocumentStore;
use super::error::{AccessError, StoreError};
use super::policy::{Capability, RoleEscalationPolicy};
use super::storage::KeyValueStore;

pub const SESSION_KEY: &str = "ministry.session.current";

pub struct SessionStore {
    local: Arc<dyn KeyValueStore>,
    devices: Arc<DeviceFingerprintService>,
    codes: Arc<dyn DocumentStore<InviteCode>>,
}

impl SessionStore {
    pub fn new(
        local: Arc<dyn KeyValueStore>,
        devices: Arc<DeviceFingerprintService>,
        codes: Arc<dyn DocumentStore<InviteCode>>,
    ) -> Self {
        Self {
            local,
            devices,
            codes,
        }
    }

    /// The cached session, if any. An unreadable record is discarded.
    pub async fn current(&self) -> Result<Option<UserSession>, AccessError> {
        let Some(raw) = self.local.get(SESSION_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<UserSession>(&raw) {
            Ok(session) if session.is_authenticated => Ok(Some(session)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!("Discarding unreadable session record: {}", e);
                self.local.remove(SESSION_KEY).await?;
                Ok(None)
            }
        }
    }

    pub async fn require(&self) -> Result<UserSession, AccessError> {
        self.current().await?.ok_or(AccessError::NotAuthenticated)
    }

    pub async fn require_capability(
        &self,
        capability: Capability,
    ) -> Result<UserSession, AccessError> {
        let session = self.require().await?;
        RoleEscalationPolicy::require(session.role, capability)?;
        Ok(session)
    }

    /// Start a session from an identity-provider login. `role` is the role
    /// stored for the user on the server.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn sign_in(&self, identity: UserInfo, role: Role) -> Result<UserSession, AccessError> {
        identity.validate()?;
        let device = self.devices.current().await?;
        let session = UserSession::new(identity, role, device, None);
        self.establish(&session).await?;
        tracing::info!(role = %role, "Signed in");
        Ok(session)
    }

    /// Replace whatever session exists with `session`.
    pub(crate) async fn establish(&self, session: &UserSession) -> Result<(), AccessError> {
        let raw = serde_json::to_string(session).map_err(StoreError::from)?;
        self.local.set(SESSION_KEY, &raw).await?;
        Ok(())
    }

    /// Apply a committed upgrade to the cached session.
    pub(crate) async fn record_role_change(
        &self,
        change: RoleChange,
    ) -> Result<UserSession, AccessError> {
        let mut session = self.require().await?;
        session.role = change.new_role;
        session.role_history.push(change);
        self.establish(&session).await?;
        Ok(session)
    }

    pub async fn logout(&self) -> Result<(), AccessError> {
        self.local.remove(SESSION_KEY).await?;
        tracing::info!("Session cleared");
        Ok(())
    }

    /// App-resume check.
    ///
    /// A session bound to another installation is torn down and reported as
    /// `DeviceMismatch`. A session whose invite code was revoked, unbound or
    /// rebound elsewhere is torn down and `Ok(None)` returned. If the code
    /// cannot be checked because the store is unreachable the session is kept.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self) -> Result<Option<UserSession>, AccessError> {
        let Some(session) = self.current().await? else {
            return Ok(None);
        };

        if !self.devices.verify(&session.bound_device).await? {
            self.logout().await?;
            return Err(AccessError::DeviceMismatch);
        }

        let Some(code) = session.source_invite_code.as_deref() else {
            return Ok(Some(session));
        };

        match self.codes.get(code).await {
            Ok(Some(stored)) if Self::still_backs_session(&stored.document, &session) => {
                Ok(Some(session))
            }
            Ok(_) => {
                tracing::info!(
                    user_id = %session.user_id(),
                    "Invite code no longer backs this session, signing out"
                );
                self.logout().await?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Could not re-check session invite code, keeping session: {}", e);
                Ok(Some(session))
            }
        }
    }

    /// Log out if the current session was created from `code`.
    pub async fn terminate_if_sourced_from(&self, code: &str) -> Result<bool, AccessError> {
        match self.current().await? {
            Some(session) if session.is_sourced_from(code) => {
                self.logout().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn still_backs_session(code: &InviteCode, session: &UserSession) -> bool {
        if !code.is_used {
            return false;
        }
        // Multi-use codes only remember the latest redeemer.
        if code.is_multi_use() {
            return true;
        }
        code.bound_device
            .as_ref()
            .is_some_and(|bound| bound.device_id == session.bound_device.device_id)
    }
}
