//! Visibility policy for Powtoon records. Pure decision logic, no I/O, so it
//! can be exercised against an in-memory store or bare records.
//!
//! Two global permissions shape the rules and must stay asymmetric:
//! - `see_any` widens read and list visibility to every record, nothing more.
//! - `share_any` grants update/delete/reshare on any record, but does not
//!   widen list visibility beyond ownership/sharing.

use crate::identity::{Permission, Principal, UserId};
use crate::store::Powtoon;

/// Access kinds checked per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Update,
    Delete,
    Reshare,
}

/// Which records a principal may see in a listing-style query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    All,
    /// Records where the user is the owner or a member of `shared_with`.
    OwnedOrSharedWith(UserId),
}

impl ListScope {
    /// Membership predicate for a single record, usable as a store filter.
    pub fn admits(&self, record: &Powtoon) -> bool {
        match self {
            ListScope::All => true,
            ListScope::OwnedOrSharedWith(user) => {
                record.owner == *user || record.shared_with.iter().any(|u| u == user)
            }
        }
    }
}

/// Listing scope for ordinary reads: widened to all records by `see_any`.
pub fn list_scope(principal: &Principal) -> ListScope {
    if principal.has(Permission::SeeAny) {
        ListScope::All
    } else {
        ListScope::OwnedOrSharedWith(principal.user_id.clone())
    }
}

/// Existence scope for reshare lookups: same shape as [`list_scope`] but keyed
/// to `share_any`. A principal without it only sees records it owns or is
/// already shared with, so sharing cannot be used to probe foreign ids.
pub fn share_scope(principal: &Principal) -> ListScope {
    if principal.has(Permission::ShareAny) {
        ListScope::All
    } else {
        ListScope::OwnedOrSharedWith(principal.user_id.clone())
    }
}

/// Per-record access decision.
///
/// Read is owner-or-shared, widened by `see_any`. Update, delete and reshare
/// all use the same owner-or-`share_any` predicate; `see_any` never grants
/// mutation rights.
pub fn can_access(principal: &Principal, record: &Powtoon, op: Operation) -> bool {
    let is_owner = record.owner == principal.user_id;
    match op {
        Operation::Read => {
            principal.has(Permission::SeeAny)
                || is_owner
                || record.shared_with.iter().any(|u| *u == principal.user_id)
        }
        Operation::Update | Operation::Delete | Operation::Reshare => {
            is_owner || principal.has(Permission::ShareAny)
        }
    }
}
