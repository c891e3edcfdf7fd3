//! Security integration tests: Argon2 authentication, permission grants, and
//! persistence of both user and record tables across a reopen of the root.

use anyhow::Result;
use tempfile::tempdir;

use powtoon::identity::Permission;
use powtoon::security::{Users, DEFAULT_ADMIN_USER};
use powtoon::service::PowtoonService;
use powtoon::store::SharedStore;

#[test]
fn argon2_auth_positive_and_negative() -> Result<()> {
    let tmp = tempdir()?;
    let users = Users::new(tmp.path())?;
    users.add_user("alice", "s3cr3t!", &[])?;

    assert!(users.authenticate("alice", "s3cr3t!"), "login with correct password should succeed");
    assert!(!users.authenticate("alice", "wrong"), "login with wrong password must fail");
    assert!(!users.authenticate("ghost", "s3cr3t!"), "unknown user must fail");
    Ok(())
}

#[test]
fn users_and_grants_survive_reopen() -> Result<()> {
    let tmp = tempdir()?;
    {
        let users = Users::new(tmp.path())?;
        users.add_user("carol", "pw", &[Permission::SeeAny])?;
        users.grant("carol", Permission::ShareAny)?;
    }
    let reopened = Users::new(tmp.path())?;
    assert!(reopened.authenticate("carol", "pw"));
    let p = reopened.principal_for("carol").expect("carol persisted");
    assert!(p.has(Permission::SeeAny));
    assert!(p.has(Permission::ShareAny));
    Ok(())
}

#[test]
fn default_admin_is_provisioned_once() -> Result<()> {
    let tmp = tempdir()?;
    let users = Users::new(tmp.path())?;
    users.ensure_default_admin()?;

    // change the password, then re-run provisioning: it must not reset
    users.add_user(DEFAULT_ADMIN_USER, "rotated", &[Permission::SeeAny, Permission::ShareAny])?;
    users.ensure_default_admin()?;
    assert!(users.authenticate(DEFAULT_ADMIN_USER, "rotated"));
    assert!(!users.authenticate(DEFAULT_ADMIN_USER, "powtoon"));
    Ok(())
}

#[test]
fn records_and_shares_survive_reopen() -> Result<()> {
    let tmp = tempdir()?;
    {
        let users = Users::new(tmp.path())?;
        users.add_user("alice", "pw", &[])?;
        users.add_user("bob", "pw", &[])?;
        let svc = PowtoonService::new(SharedStore::new(tmp.path())?, users.clone());
        let alice = users.principal_for("alice").unwrap();
        let rec = svc.create(&alice, "kept", Some(serde_json::json!({"n": 1})))?;
        svc.reshare(&alice, rec.id, &["bob".to_string()])?;
    }

    let users = Users::new(tmp.path())?;
    let svc = PowtoonService::new(SharedStore::new(tmp.path())?, users.clone());
    let bob = users.principal_for("bob").unwrap();
    let visible = svc.list(&bob)?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "kept");
    assert_eq!(visible[0].shared_with, vec!["bob"]);
    Ok(())
}

#[test]
fn revoked_permission_stops_applying_to_new_principals() -> Result<()> {
    let tmp = tempdir()?;
    let users = Users::new(tmp.path())?;
    users.add_user("owner", "pw", &[])?;
    users.add_user("seer", "pw", &[Permission::SeeAny])?;
    let svc = PowtoonService::new(SharedStore::new(tmp.path())?, users.clone());

    let owner = users.principal_for("owner").unwrap();
    let rec = svc.create(&owner, "private", None)?;

    let seer = users.principal_for("seer").unwrap();
    assert!(svc.get(&seer, rec.id).is_ok());

    users.revoke("seer", Permission::SeeAny)?;
    // the already-issued principal is immutable for its request; a freshly
    // resolved one reflects the revocation
    let seer_after = users.principal_for("seer").unwrap();
    assert_eq!(svc.get(&seer_after, rec.id).unwrap_err().http_status(), 404);
    Ok(())
}
