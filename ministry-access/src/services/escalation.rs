//! Committing role upgrades for the signed-in user.

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use crate::models::invite_code::{normalize_code, parse_code_role};
use crate::models::{Role, RoleChange, UserProfile};

use super::document_store::DocumentStore;
use super::error::AccessError;
use super::invite::InviteCodeRegistry;
use super::session::SessionStore;
use super::transaction::{run_transaction, Commit, TransactionPolicy};

pub struct RoleEscalation {
    sessions: Arc<SessionStore>,
    invites: Arc<InviteCodeRegistry>,
    users: Arc<dyn DocumentStore<UserProfile>>,
    policy: TransactionPolicy,
}

impl RoleEscalation {
    pub fn new(
        sessions: Arc<SessionStore>,
        invites: Arc<InviteCodeRegistry>,
        users: Arc<dyn DocumentStore<UserProfile>>,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            sessions,
            invites,
            users,
            policy,
        }
    }

    /// Raise the current user's role with `code`. Returns the new role.
    ///
    /// The code use is taken first; if recording the change on the profile
    /// fails the use is handed back.
    #[instrument(skip(self, code))]
    pub async fn upgrade(&self, code: &str) -> Result<Role, AccessError> {
        let session = self.sessions.require().await?;
        let code = normalize_code(code);
        if parse_code_role(&code).is_none() {
            return Err(AccessError::InvalidCode);
        }

        let device = session.bound_device.clone();
        let redeemed = self
            .invites
            .consume(
                &code,
                device.clone(),
                session.identity.clone(),
                Some(session.role),
            )
            .await?;

        let change = RoleChange {
            previous_role: session.role,
            new_role: redeemed.role,
            upgrade_date: Utc::now(),
            code_used: code.clone(),
        };

        if let Err(e) = self.commit_to_profile(session.user_id(), &change).await {
            self.invites
                .release_after_failure(&code, &device.device_id)
                .await;
            return Err(e);
        }

        // The upgrade is committed server-side at this point; a stale local
        // session is corrected by the next sign-in, which reads the profile role.
        let updated = match self.sessions.record_role_change(change).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    user_id = %session.user_id(),
                    new_role = %redeemed.role,
                    "Role upgrade committed but the local session could not be updated: {}",
                    e
                );
                return Err(e);
            }
        };
        tracing::info!(
            user_id = %updated.user_id(),
            from = %session.role,
            to = %updated.role,
            "Role upgraded"
        );
        Ok(updated.role)
    }

    async fn commit_to_profile(&self, user_id: &str, change: &RoleChange) -> Result<(), AccessError> {
        run_transaction(self.users.as_ref(), user_id, self.policy, |current| {
            let mut profile = current
                .unwrap_or_else(|| UserProfile::new(user_id.to_string(), change.previous_role));
            profile.apply_upgrade(change.clone());
            Ok::<_, AccessError>((Commit::Write(profile), ()))
        })
        .await
    }
}
