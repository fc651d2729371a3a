//! Invite code lifecycle: generate, activate, revoke, unbind.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::models::invite_code::{generate_code, normalize_code, parse_code_role};
use crate::models::{
    CodeFilter, DeviceFingerprint, InviteCode, Role, RoleChange, UserInfo, UserProfile,
    UserSession,
};

use super::device::DeviceFingerprintService;
use super::document_store::DocumentStore;
use super::error::{AccessError, StoreError};
use super::policy::{Capability, RoleEscalationPolicy};
use super::session::SessionStore;
use super::transaction::{run_transaction, Commit, TransactionPolicy};

const MAX_GENERATE_ATTEMPTS: u32 = 5;

/// Overrides for [`InviteCodeRegistry::generate_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Falls back to the registry default when unset.
    pub validity: Option<Duration>,
    pub max_uses: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            validity: None,
            max_uses: 1,
        }
    }
}

pub struct InviteCodeRegistry {
    codes: Arc<dyn DocumentStore<InviteCode>>,
    users: Arc<dyn DocumentStore<UserProfile>>,
    sessions: Arc<SessionStore>,
    devices: Arc<DeviceFingerprintService>,
    default_validity: Duration,
    policy: TransactionPolicy,
}

impl InviteCodeRegistry {
    pub fn new(
        codes: Arc<dyn DocumentStore<InviteCode>>,
        users: Arc<dyn DocumentStore<UserProfile>>,
        sessions: Arc<SessionStore>,
        devices: Arc<DeviceFingerprintService>,
        default_validity: Duration,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            codes,
            users,
            sessions,
            devices,
            default_validity,
            policy,
        }
    }

    pub async fn generate(
        &self,
        role: Role,
        created_for: &str,
        description: Option<String>,
    ) -> Result<InviteCode, AccessError> {
        self.generate_with(role, created_for, description, GenerateOptions::default())
            .await
    }

    #[instrument(skip(self, description))]
    pub async fn generate_with(
        &self,
        role: Role,
        created_for: &str,
        description: Option<String>,
        options: GenerateOptions,
    ) -> Result<InviteCode, AccessError> {
        let issuer = self
            .sessions
            .require_capability(Capability::GenerateInviteCodes)
            .await?;

        let created_for = created_for.trim();
        if created_for.is_empty() {
            return Err(AccessError::InvalidInput(
                "created_for must not be empty".to_string(),
            ));
        }
        if options.max_uses == 0 {
            return Err(AccessError::InvalidInput(
                "max_uses must be at least 1".to_string(),
            ));
        }
        let validity = options.validity.unwrap_or(self.default_validity);
        if validity <= Duration::zero() {
            return Err(AccessError::InvalidInput(
                "validity must be positive".to_string(),
            ));
        }

        for attempt in 1..=MAX_GENERATE_ATTEMPTS {
            let text = generate_code(role, &mut rand::thread_rng());
            let invite = InviteCode::new(
                text,
                role,
                created_for.to_string(),
                issuer.user_id().to_string(),
                description.clone(),
                validity,
                options.max_uses,
            );

            if self.codes.insert(&invite).await? {
                tracing::info!(
                    max_uses = invite.max_uses,
                    expires_at = %invite.expires_at,
                    "Invite code generated"
                );
                return Ok(invite);
            }
            tracing::warn!(attempt, "Generated invite code collided, regenerating");
        }

        Err(StoreError::Internal(anyhow::anyhow!(
            "Could not generate a unique invite code after {} attempts",
            MAX_GENERATE_ATTEMPTS
        ))
        .into())
    }

    /// Redeem `code` on this device and start a session with its role.
    #[instrument(skip(self, code, user), fields(user_id = %user.user_id))]
    pub async fn activate(&self, code: &str, user: UserInfo) -> Result<UserSession, AccessError> {
        let result = self.activate_inner(code, user).await;
        metrics::counter!("invite_activation_total", "outcome" => activation_outcome(&result))
            .increment(1);
        result
    }

    async fn activate_inner(&self, code: &str, user: UserInfo) -> Result<UserSession, AccessError> {
        let code = normalize_code(code);
        if parse_code_role(&code).is_none() {
            return Err(AccessError::InvalidCode);
        }
        user.validate()?;

        let device = self.devices.current().await?;
        let redeemed = self
            .consume(&code, device.clone(), user.clone(), None)
            .await?;

        match self.finish_activation(&redeemed, user, device.clone()).await {
            Ok(session) => {
                tracing::info!(
                    role = %session.role,
                    device = %device.digest(),
                    "Invite code activated"
                );
                Ok(session)
            }
            Err(e) => {
                self.release_after_failure(&code, &device.device_id).await;
                Err(e)
            }
        }
    }

    async fn finish_activation(
        &self,
        redeemed: &InviteCode,
        user: UserInfo,
        device: DeviceFingerprint,
    ) -> Result<UserSession, AccessError> {
        let role = redeemed.role;
        let user_id = user.user_id.clone();
        let profile = run_transaction(self.users.as_ref(), &user_id, self.policy, |current| {
            let Some(mut profile) = current else {
                let profile = UserProfile::new(user_id.clone(), role);
                return Ok::<_, AccessError>((Commit::Write(profile.clone()), profile));
            };
            // An existing profile only ever moves up, and every raise is recorded.
            match RoleEscalationPolicy::check_upgrade(profile.role, role) {
                Ok(new_role) => {
                    profile.apply_upgrade(RoleChange {
                        previous_role: profile.role,
                        new_role,
                        upgrade_date: Utc::now(),
                        code_used: redeemed.code.clone(),
                    });
                    Ok((Commit::Write(profile.clone()), profile))
                }
                Err(_) => Ok((Commit::Unchanged, profile)),
            }
        })
        .await?;

        if profile.role != role {
            tracing::info!(
                code_role = %role,
                profile_role = %profile.role,
                "Activated code below the stored role, keeping the stored role"
            );
        }
        let mut session = UserSession::new(user, profile.role, device, Some(redeemed.code.clone()));
        session.role_history = profile.role_history;
        self.sessions.establish(&session).await?;
        Ok(session)
    }

    /// Take one use of `code` for `device` in a single document transaction.
    ///
    /// With `upgrading_from` set the code must also raise that role; the
    /// check runs against the same snapshot the use is taken from.
    pub(crate) async fn consume(
        &self,
        code: &str,
        device: DeviceFingerprint,
        user: UserInfo,
        upgrading_from: Option<Role>,
    ) -> Result<InviteCode, AccessError> {
        run_transaction(self.codes.as_ref(), code, self.policy, |current| {
            let mut invite = current.ok_or(AccessError::InvalidCode)?;
            invite.check_redeemable(Utc::now())?;
            if let Some(from) = upgrading_from {
                RoleEscalationPolicy::check_upgrade(from, invite.role)?;
            }
            invite.redeem(device.clone(), user.clone(), Utc::now());
            Ok::<_, AccessError>((Commit::Write(invite.clone()), invite))
        })
        .await
    }

    /// Give back a use taken by `device_id`. Returns false when there was
    /// nothing to give back.
    pub(crate) async fn release(&self, code: &str, device_id: &str) -> Result<bool, AccessError> {
        run_transaction(self.codes.as_ref(), code, self.policy, |current| {
            let Some(mut invite) = current else {
                return Ok((Commit::Unchanged, false));
            };
            if invite.release(device_id) {
                Ok((Commit::Write(invite), true))
            } else {
                Ok::<_, AccessError>((Commit::Unchanged, false))
            }
        })
        .await
    }

    /// Compensation for a redeem whose follow-up steps failed. The original
    /// failure is what the caller sees, so a failed release is only logged.
    pub(crate) async fn release_after_failure(&self, code: &str, device_id: &str) {
        match self.release(code, device_id).await {
            Ok(released) => {
                tracing::warn!(released, "Released invite code use after a failed follow-up step")
            }
            Err(e) => tracing::error!("Failed to release invite code use: {}", e),
        }
    }

    #[instrument(skip(self))]
    pub async fn revoke(&self, code: &str) -> Result<(), AccessError> {
        self.sessions
            .require_capability(Capability::RevokeInviteCodes)
            .await?;
        let code = normalize_code(code);

        if !self.codes.delete(&code).await? {
            return Err(AccessError::CodeNotFound);
        }
        let logged_out = self.sessions.terminate_if_sourced_from(&code).await?;
        tracing::info!(logged_out, "Invite code revoked");
        Ok(())
    }

    /// Return `code` to the unused state so it can be activated again,
    /// typically on a replacement phone.
    #[instrument(skip(self))]
    pub async fn unbind_device(&self, code: &str) -> Result<InviteCode, AccessError> {
        self.sessions
            .require_capability(Capability::UnbindDevices)
            .await?;
        let code = normalize_code(code);

        let invite = run_transaction(self.codes.as_ref(), &code, self.policy, |current| {
            let mut invite = current.ok_or(AccessError::CodeNotFound)?;
            invite.unbind();
            Ok::<_, AccessError>((Commit::Write(invite.clone()), invite))
        })
        .await?;

        let logged_out = self.sessions.terminate_if_sourced_from(&code).await?;
        tracing::info!(logged_out, "Invite code unbound from device");
        Ok(invite)
    }

    /// Validate `code` the way activation would, without consuming it.
    pub async fn lookup(&self, code: &str) -> Result<InviteCode, AccessError> {
        let code = normalize_code(code);
        if parse_code_role(&code).is_none() {
            return Err(AccessError::InvalidCode);
        }
        let invite = self.find(&code).await?.ok_or(AccessError::InvalidCode)?;
        invite.check_redeemable(Utc::now())?;
        Ok(invite)
    }

    pub async fn find(&self, code: &str) -> Result<Option<InviteCode>, AccessError> {
        let code = normalize_code(code);
        Ok(self.codes.get(&code).await?.map(|v| v.document))
    }

    /// Codes matching `filter`, newest first.
    pub async fn list(&self, filter: &CodeFilter) -> Result<Vec<InviteCode>, AccessError> {
        self.sessions
            .require_capability(Capability::ViewInviteCodes)
            .await?;
        let mut codes: Vec<InviteCode> = self
            .codes
            .list()
            .await?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect();
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(codes)
    }
}

fn activation_outcome(result: &Result<UserSession, AccessError>) -> &'static str {
    match result {
        Ok(_) => "activated",
        Err(AccessError::InvalidCode) => "invalid",
        Err(AccessError::CodeExpired) => "expired",
        Err(AccessError::CodeAlreadyUsed) => "already_used",
        Err(AccessError::CodeExhausted) => "exhausted",
        Err(AccessError::Validation(_)) => "invalid_user",
        Err(_) => "error",
    }
}
