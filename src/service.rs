//! Record service: orchestrates create/read/update/delete/reshare over the
//! store by consulting the visibility policy, returning classified outcomes
//! independent of any transport.
//!
//! Failure classification rules worth keeping straight:
//! - `get` returns NotFound for both absent and invisible records, so callers
//!   cannot probe which ids exist.
//! - `update` returns Forbidden once the record is admitted, but `delete`
//!   returns NotFound on the same denial. That asymmetry is intentional and
//!   covered by tests.
//! - `reshare` runs its existence check through the share scope before any
//!   ownership/permission decision.

use crate::error::{ApiError, ApiResult};
use crate::identity::{Principal, UserDirectory, UserId};
use crate::policy::{self, Operation};
use crate::store::{Powtoon, PowtoonPatch, RecordStore};

#[derive(Clone)]
pub struct PowtoonService<S, D> {
    store: S,
    users: D,
}

impl<S: RecordStore, D: UserDirectory> PowtoonService<S, D> {
    pub fn new(store: S, users: D) -> Self {
        Self { store, users }
    }

    /// All records visible to the principal; never fails for an
    /// authenticated principal.
    pub fn list(&self, principal: &Principal) -> ApiResult<Vec<Powtoon>> {
        let scope = policy::list_scope(principal);
        Ok(self.store.query(&scope)?)
    }

    pub fn get(&self, principal: &Principal, id: i64) -> ApiResult<Powtoon> {
        match self.store.find_by_id(id)? {
            Some(rec) if policy::can_access(principal, &rec, Operation::Read) => Ok(rec),
            _ => Err(not_found(id)),
        }
    }

    /// Always succeeds for an authenticated principal, who becomes the owner.
    pub fn create(
        &self,
        principal: &Principal,
        name: &str,
        content: Option<serde_json::Value>,
    ) -> ApiResult<Powtoon> {
        Ok(self.store.insert(&principal.user_id, name, content)?)
    }

    pub fn update(&self, principal: &Principal, id: i64, patch: &PowtoonPatch) -> ApiResult<Powtoon> {
        let Some(rec) = self.store.find_by_id(id)? else {
            return Err(not_found(id));
        };
        if !policy::can_access(principal, &rec, Operation::Update) {
            return Err(ApiError::forbidden(
                "forbidden".into(),
                format!("not allowed to update powtoon {}", id),
            ));
        }
        Ok(self.store.update(id, patch)?)
    }

    /// Authorization failure reports NotFound here, unlike `update`.
    pub fn delete(&self, principal: &Principal, id: i64) -> ApiResult<()> {
        let Some(rec) = self.store.find_by_id(id)? else {
            return Err(not_found(id));
        };
        if !policy::can_access(principal, &rec, Operation::Delete) {
            return Err(not_found(id));
        }
        self.store.delete(id)?;
        Ok(())
    }

    /// Records visible through the share scope, for the shared-listing surface.
    pub fn list_shared(&self, principal: &Principal) -> ApiResult<Vec<Powtoon>> {
        let scope = policy::share_scope(principal);
        Ok(self.store.query(&scope)?)
    }

    /// Add users to a record's `shared_with` set (idempotent union) and return
    /// the record with its current membership.
    pub fn reshare(&self, principal: &Principal, id: i64, users: &[UserId]) -> ApiResult<Powtoon> {
        // Existence is checked through the share scope first: outside it the
        // record does not exist as far as this principal can tell.
        let scope = policy::share_scope(principal);
        let admitted = match self.store.find_by_id(id)? {
            Some(rec) if scope.admits(&rec) => rec,
            _ => return Err(not_found(id)),
        };
        if !policy::can_access(principal, &admitted, Operation::Reshare) {
            return Err(ApiError::forbidden(
                "forbidden".into(),
                format!("not allowed to share powtoon {}", id),
            ));
        }
        if let Some(unknown) = users.iter().find(|u| !self.users.user_exists(u)) {
            return Err(ApiError::validation(
                "unknown_user".into(),
                format!("unknown user id: {}", unknown),
            ));
        }
        Ok(self.store.add_shared_users(id, users)?)
    }
}

fn not_found(id: i64) -> ApiError {
    ApiError::not_found("not_found".into(), format!("powtoon {} not found", id))
}
