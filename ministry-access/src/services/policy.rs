//! Role hierarchy and capability table.
//!
//! Everything here is pure. Callers look up capabilities instead of
//! comparing roles inline.

use crate::models::Role;

use super::error::AccessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ViewEvents,
    RsvpEvents,
    CreateEvents,
    ManageOwnEvents,
    ManageAnyEvent,
    GenerateInviteCodes,
    RevokeInviteCodes,
    UnbindDevices,
    ViewInviteCodes,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewEvents => "view_events",
            Capability::RsvpEvents => "rsvp_events",
            Capability::CreateEvents => "create_events",
            Capability::ManageOwnEvents => "manage_own_events",
            Capability::ManageAnyEvent => "manage_any_event",
            Capability::GenerateInviteCodes => "generate_invite_codes",
            Capability::RevokeInviteCodes => "revoke_invite_codes",
            Capability::UnbindDevices => "unbind_devices",
            Capability::ViewInviteCodes => "view_invite_codes",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const ALL_ROLES: &[Role] = &[Role::Student, Role::CoreMember, Role::Admin];
const ORGANIZERS: &[Role] = &[Role::CoreMember, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];

static CAPABILITY_TABLE: &[(Capability, &[Role])] = &[
    (Capability::ViewEvents, ALL_ROLES),
    (Capability::RsvpEvents, ALL_ROLES),
    (Capability::CreateEvents, ORGANIZERS),
    (Capability::ManageOwnEvents, ORGANIZERS),
    (Capability::ManageAnyEvent, ADMINS),
    (Capability::GenerateInviteCodes, ADMINS),
    (Capability::RevokeInviteCodes, ADMINS),
    (Capability::UnbindDevices, ADMINS),
    (Capability::ViewInviteCodes, ADMINS),
];

pub struct RoleEscalationPolicy;

impl RoleEscalationPolicy {
    /// An upgrade must move strictly up the hierarchy. Returns the new role.
    pub fn check_upgrade(current: Role, target: Role) -> Result<Role, AccessError> {
        if target.rank() <= current.rank() {
            return Err(AccessError::IllegalDowngrade { current, target });
        }
        Ok(target)
    }

    pub fn has_capability(role: Role, capability: Capability) -> bool {
        CAPABILITY_TABLE
            .iter()
            .find(|(cap, _)| *cap == capability)
            .is_some_and(|(_, roles)| roles.contains(&role))
    }

    pub fn capabilities_of(role: Role) -> Vec<Capability> {
        CAPABILITY_TABLE
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(cap, _)| *cap)
            .collect()
    }

    pub fn require(role: Role, capability: Capability) -> Result<(), AccessError> {
        if Self::has_capability(role, capability) {
            Ok(())
        } else {
            Err(AccessError::PermissionDenied(capability))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrades_only_move_up() {
        assert_eq!(
            RoleEscalationPolicy::check_upgrade(Role::Student, Role::CoreMember).unwrap(),
            Role::CoreMember
        );
        assert_eq!(
            RoleEscalationPolicy::check_upgrade(Role::Student, Role::Admin).unwrap(),
            Role::Admin
        );
        assert!(matches!(
            RoleEscalationPolicy::check_upgrade(Role::CoreMember, Role::CoreMember),
            Err(AccessError::IllegalDowngrade { .. })
        ));
        assert!(matches!(
            RoleEscalationPolicy::check_upgrade(Role::Admin, Role::Student),
            Err(AccessError::IllegalDowngrade {
                current: Role::Admin,
                target: Role::Student
            })
        ));
    }

    #[test]
    fn test_every_role_can_view_and_rsvp() {
        for role in Role::ALL {
            assert!(RoleEscalationPolicy::has_capability(role, Capability::ViewEvents));
            assert!(RoleEscalationPolicy::has_capability(role, Capability::RsvpEvents));
        }
    }

    #[test]
    fn test_organizer_capabilities() {
        assert!(!RoleEscalationPolicy::has_capability(Role::Student, Capability::CreateEvents));
        assert!(RoleEscalationPolicy::has_capability(Role::CoreMember, Capability::CreateEvents));
        assert!(RoleEscalationPolicy::has_capability(Role::CoreMember, Capability::ManageOwnEvents));
        assert!(!RoleEscalationPolicy::has_capability(Role::CoreMember, Capability::ManageAnyEvent));
        assert!(RoleEscalationPolicy::has_capability(Role::Admin, Capability::ManageAnyEvent));
    }

    #[test]
    fn test_invite_administration_is_admin_only() {
        for cap in [
            Capability::GenerateInviteCodes,
            Capability::RevokeInviteCodes,
            Capability::UnbindDevices,
            Capability::ViewInviteCodes,
        ] {
            assert!(RoleEscalationPolicy::has_capability(Role::Admin, cap));
            assert!(!RoleEscalationPolicy::has_capability(Role::CoreMember, cap));
            assert!(!RoleEscalationPolicy::has_capability(Role::Student, cap));
        }
    }

    #[test]
    fn test_capability_sets_grow_with_rank() {
        let student = RoleEscalationPolicy::capabilities_of(Role::Student);
        let core = RoleEscalationPolicy::capabilities_of(Role::CoreMember);
        let admin = RoleEscalationPolicy::capabilities_of(Role::Admin);
        assert_eq!(student.len(), 2);
        assert!(student.iter().all(|c| core.contains(c)));
        assert!(core.iter().all(|c| admin.contains(c)));
        assert_eq!(admin.len(), 9);
    }

    #[test]
    fn test_require_reports_missing_capability() {
        let err = RoleEscalationPolicy::require(Role::Student, Capability::UnbindDevices).unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied(Capability::UnbindDevices)));
        assert_eq!(err.to_string(), "Permission denied: requires unbind_devices");
    }
}
