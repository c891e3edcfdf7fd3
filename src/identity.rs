//! Principal and permission types shared by the policy, service and server layers.
//! Keep the surface thin: a principal is a user id plus the set of global
//! permissions resolved at authentication time, immutable for the request.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Identifier for an actor. Usernames double as ids in the default security store.
pub type UserId = String;

/// Global permissions that bypass per-record ownership/sharing checks.
///
/// The two are independent: `SeeAny` widens read/list visibility only, and
/// `ShareAny` grants update/delete/reshare on any record without widening
/// visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    SeeAny,
    ShareAny,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::SeeAny => "see_any",
            Permission::ShareAny => "share_any",
        }
    }

    pub fn parse(s: &str) -> Option<Permission> {
        match s {
            "see_any" => Some(Permission::SeeAny),
            "share_any" => Some(Permission::ShareAny),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    #[serde(default)]
    pub permissions: HashSet<Permission>,
}

impl Principal {
    pub fn new<S: Into<UserId>>(user_id: S) -> Self {
        Self { user_id: user_id.into(), permissions: HashSet::new() }
    }

    pub fn with_permissions<S: Into<UserId>>(user_id: S, perms: &[Permission]) -> Self {
        Self { user_id: user_id.into(), permissions: perms.iter().copied().collect() }
    }

    pub fn has(&self, perm: Permission) -> bool {
        self.permissions.contains(&perm)
    }
}

/// Answers whether a user id names a known account. Used by the share
/// operation to reject unknown recipients before mutating anything.
pub trait UserDirectory: Send + Sync {
    fn user_exists(&self, user: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_round_trip() {
        for p in [Permission::SeeAny, Permission::ShareAny] {
            assert_eq!(Permission::parse(p.as_str()), Some(p));
        }
        assert_eq!(Permission::parse("admin"), None);
    }

    #[test]
    fn permissions_are_independent() {
        let seer = Principal::with_permissions("u", &[Permission::SeeAny]);
        assert!(seer.has(Permission::SeeAny));
        assert!(!seer.has(Permission::ShareAny));

        let sharer = Principal::with_permissions("u", &[Permission::ShareAny]);
        assert!(sharer.has(Permission::ShareAny));
        assert!(!sharer.has(Permission::SeeAny));
    }
}
