//! Invite code model - role-granting codes bound to one device on activation.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{DeviceFingerprint, Role, UserInfo};
use crate::services::Document;

/// Uppercase alphanumerics without the confusable `0`, `1`, `O` and `I`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_GROUPS: usize = 6;
pub const CODE_GROUP_LEN: usize = 4;

/// Generate `<PREFIX>-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX` for `role`.
pub fn generate_code<R: Rng + ?Sized>(role: Role, rng: &mut R) -> String {
    let mut code = String::with_capacity(2 + CODE_GROUPS * (CODE_GROUP_LEN + 1));
    code.push_str(role.code_prefix());
    for _ in 0..CODE_GROUPS {
        code.push('-');
        for _ in 0..CODE_GROUP_LEN {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            code.push(CODE_ALPHABET[idx] as char);
        }
    }
    code
}

/// Canonical form of user-typed input.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Role encoded in a well-formed code, `None` for anything malformed.
pub fn parse_code_role(code: &str) -> Option<Role> {
    let mut parts = code.split('-');
    let role = Role::from_code_prefix(parts.next()?)?;
    let groups: Vec<&str> = parts.collect();
    if groups.len() != CODE_GROUPS {
        return None;
    }
    let well_formed = groups.iter().all(|g| {
        g.len() == CODE_GROUP_LEN && g.bytes().all(|b| CODE_ALPHABET.contains(&b))
    });
    well_formed.then_some(role)
}

/// Why a known code cannot be redeemed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRejection {
    AlreadyUsed,
    Exhausted,
    Expired,
}

fn default_max_uses() -> u32 {
    1
}

/// Invite code entity, stored in `invite_codes` keyed by `code`.
///
/// `bound_device` and `activated_by` are set iff `is_used`. For multi-use
/// codes they describe the most recent redemption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteCode {
    pub code: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_for: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_max_uses")]
    pub max_uses: u32,
    #[serde(default)]
    pub use_count: u32,
    pub is_used: bool,
    #[serde(default)]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bound_device: Option<DeviceFingerprint>,
    #[serde(default)]
    pub activated_by: Option<UserInfo>,
}

impl InviteCode {
    pub fn new(
        code: String,
        role: Role,
        created_for: String,
        created_by: String,
        description: Option<String>,
        validity: Duration,
        max_uses: u32,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            code,
            role,
            description,
            created_for,
            created_by,
            created_at,
            expires_at: created_at + validity,
            max_uses: max_uses.max(1),
            use_count: 0,
            is_used: false,
            used_at: None,
            bound_device: None,
            activated_by: None,
        }
    }

    pub fn is_multi_use(&self) -> bool {
        self.max_uses > 1
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.use_count)
    }

    /// Check whether one more redemption is allowed at `now`.
    ///
    /// Use state is checked before expiry, so a consumed code that has also
    /// lapsed reports as used.
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<(), CodeRejection> {
        if self.is_multi_use() {
            if self.remaining_uses() == 0 {
                return Err(CodeRejection::Exhausted);
            }
        } else if self.is_used {
            return Err(CodeRejection::AlreadyUsed);
        }
        if self.is_expired_at(now) {
            return Err(CodeRejection::Expired);
        }
        Ok(())
    }

    /// Consume one use and bind it to `device`. Callers check
    /// [`check_redeemable`](Self::check_redeemable) first.
    pub fn redeem(&mut self, device: DeviceFingerprint, user: UserInfo, now: DateTime<Utc>) {
        self.use_count += 1;
        self.is_used = true;
        self.used_at = Some(now);
        self.bound_device = Some(device);
        self.activated_by = Some(user);
    }

    /// Give back a use taken by `device_id` whose follow-up steps failed.
    /// Returns false when the code is no longer bound to that device.
    pub fn release(&mut self, device_id: &str) -> bool {
        let bound_here = self
            .bound_device
            .as_ref()
            .is_some_and(|d| d.device_id == device_id);
        if !bound_here || self.use_count == 0 {
            return false;
        }
        self.use_count -= 1;
        if self.use_count == 0 {
            self.clear_binding();
        }
        true
    }

    /// Reset to activatable: no uses, no device, no activating user.
    pub fn unbind(&mut self) {
        self.use_count = 0;
        self.clear_binding();
    }

    fn clear_binding(&mut self) {
        self.is_used = false;
        self.used_at = None;
        self.bound_device = None;
        self.activated_by = None;
    }
}

impl Document for InviteCode {
    const COLLECTION: &'static str = "invite_codes";

    fn document_id(&self) -> &str {
        &self.code
    }
}

/// Listing filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CodeFilter {
    pub role: Option<Role>,
    pub used: Option<bool>,
}

impl CodeFilter {
    pub fn matches(&self, code: &InviteCode) -> bool {
        self.role.map_or(true, |r| r == code.role) && self.used.map_or(true, |u| u == code.is_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> DeviceFingerprint {
        DeviceFingerprint {
            device_id: id.to_string(),
            brand: "Apple".to_string(),
            model: "iPhone 15".to_string(),
            os_version: "17.4".to_string(),
            app_id: "org.campus.ministry".to_string(),
        }
    }

    fn user() -> UserInfo {
        UserInfo {
            user_id: "u-1".to_string(),
            name: "Grace".to_string(),
            campus: "North".to_string(),
            email: "grace@example.edu".to_string(),
        }
    }

    fn code(max_uses: u32) -> InviteCode {
        InviteCode::new(
            "CM-ABCD-EFGH-JKLM-NPQR-STUV-WXYZ".to_string(),
            Role::CoreMember,
            "small group leaders".to_string(),
            "admin-1".to_string(),
            None,
            Duration::days(365),
            max_uses,
        )
    }

    #[test]
    fn test_generated_code_format() {
        let mut rng = rand::thread_rng();
        for role in Role::ALL {
            let code = generate_code(role, &mut rng);
            assert_eq!(code.len(), 2 + 6 * 5);
            assert!(code.starts_with(&format!("{}-", role.code_prefix())));
            assert_eq!(parse_code_role(&code), Some(role));
            assert!(!code[3..].contains(['0', '1', 'O', 'I']));
        }
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        assert_eq!(parse_code_role("CM-ABCD-EFGH"), None);
        assert_eq!(parse_code_role("XX-ABCD-EFGH-JKLM-NPQR-STUV-WXYZ"), None);
        assert_eq!(parse_code_role("CM-ABC0-EFGH-JKLM-NPQR-STUV-WXYZ"), None);
        assert_eq!(parse_code_role("CM-ABCDE-FGH-JKLM-NPQR-STUV-WXYZ"), None);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(
            normalize_code("  cm-abcd-efgh-jklm-npqr-stuv-wxyz \n"),
            "CM-ABCD-EFGH-JKLM-NPQR-STUV-WXYZ"
        );
    }

    #[test]
    fn test_new_code_is_unused() {
        let code = code(1);
        assert!(!code.is_used);
        assert!(code.bound_device.is_none());
        assert_eq!(code.remaining_uses(), 1);
        assert!(code.check_redeemable(Utc::now()).is_ok());
    }

    #[test]
    fn test_single_use_code_rejects_second_redemption() {
        let mut code = code(1);
        code.redeem(device("d-1"), user(), Utc::now());
        assert!(code.is_used);
        assert!(code.bound_device.is_some());
        assert_eq!(
            code.check_redeemable(Utc::now()),
            Err(CodeRejection::AlreadyUsed)
        );
    }

    #[test]
    fn test_used_is_reported_before_expired() {
        let mut code = code(1);
        code.redeem(device("d-1"), user(), Utc::now());
        let later = code.expires_at + Duration::days(1);
        assert_eq!(code.check_redeemable(later), Err(CodeRejection::AlreadyUsed));
    }

    #[test]
    fn test_expiry_boundary() {
        let code = code(1);
        assert!(code.check_redeemable(code.expires_at).is_ok());
        assert_eq!(
            code.check_redeemable(code.expires_at + Duration::seconds(1)),
            Err(CodeRejection::Expired)
        );
    }

    #[test]
    fn test_multi_use_code_exhausts() {
        let mut code = code(2);
        code.redeem(device("d-1"), user(), Utc::now());
        assert!(code.check_redeemable(Utc::now()).is_ok());
        code.redeem(device("d-2"), user(), Utc::now());
        assert_eq!(code.remaining_uses(), 0);
        assert_eq!(code.check_redeemable(Utc::now()), Err(CodeRejection::Exhausted));
    }

    #[test]
    fn test_release_only_for_bound_device() {
        let mut code = code(1);
        code.redeem(device("d-1"), user(), Utc::now());
        assert!(!code.release("d-2"));
        assert!(code.is_used);
        assert!(code.release("d-1"));
        assert!(!code.is_used);
        assert!(code.bound_device.is_none());
        assert!(code.activated_by.is_none());
    }

    #[test]
    fn test_unbind_resets_everything() {
        let mut code = code(3);
        code.redeem(device("d-1"), user(), Utc::now());
        code.redeem(device("d-2"), user(), Utc::now());
        code.unbind();
        assert_eq!(code.use_count, 0);
        assert!(!code.is_used);
        assert!(code.used_at.is_none());
        assert!(code.bound_device.is_none());
        assert!(code.activated_by.is_none());
    }

    #[test]
    fn test_filter() {
        let mut used = code(1);
        used.redeem(device("d-1"), user(), Utc::now());
        let unused = code(1);

        let only_unused = CodeFilter {
            role: Some(Role::CoreMember),
            used: Some(false),
        };
        assert!(only_unused.matches(&unused));
        assert!(!only_unused.matches(&used));

        let admins = CodeFilter {
            role: Some(Role::Admin),
            used: None,
        };
        assert!(!admins.matches(&unused));
        assert!(CodeFilter::default().matches(&used));
    }
}
