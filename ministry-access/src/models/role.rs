//! Role hierarchy and the append-only role history entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ministry roles, lowest privilege first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    CoreMember,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::CoreMember, Role::Admin];

    /// Position in the strict total order `student < core_member < admin`.
    pub fn rank(self) -> u8 {
        match self {
            Role::Student => 0,
            Role::CoreMember => 1,
            Role::Admin => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::CoreMember => "core_member",
            Role::Admin => "admin",
        }
    }

    /// Prefix an invite code for this role starts with.
    pub fn code_prefix(self) -> &'static str {
        match self {
            Role::Student => "ST",
            Role::CoreMember => "CM",
            Role::Admin => "AD",
        }
    }

    pub fn from_code_prefix(prefix: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.code_prefix() == prefix)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "core_member" => Ok(Role::CoreMember),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// One committed role upgrade. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    pub previous_role: Role,
    pub new_role: Role,
    pub upgrade_date: DateTime<Utc>,
    pub code_used: String,
}
