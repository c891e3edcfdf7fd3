//! User accounts and permission grants backing authentication for the HTTP
//! layer. Accounts live under the store root in `users.json`; passwords are
//! stored as Argon2 PHC strings. The two global grants (`see_any`,
//! `share_any`) are plain per-user flags, mirroring a permission table.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io};

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::identity::{Permission, Principal, UserDirectory};

const USERS_FILE: &str = "users.json";
pub const DEFAULT_ADMIN_USER: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "powtoon";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    password_hash: String,
    #[serde(default)]
    permissions: HashSet<Permission>,
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

/// Shared user registry, cloneable into server state and the service's
/// user-directory seam.
#[derive(Clone)]
pub struct Users {
    root: Option<PathBuf>,
    map: Arc<RwLock<BTreeMap<String, UserRecord>>>,
}

impl Users {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create users root: {}", root.display()))?;
        let map = Self::load(&root)?;
        Ok(Self { root: Some(root), map: Arc::new(RwLock::new(map)) })
    }

    pub fn in_memory() -> Self {
        Self { root: None, map: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    fn load(root: &Path) -> Result<BTreeMap<String, UserRecord>> {
        let path = root.join(USERS_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt users file: {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn persist(&self, map: &BTreeMap<String, UserRecord>) -> Result<()> {
        let Some(root) = &self.root else { return Ok(()) };
        let path = root.join(USERS_FILE);
        let bytes = serde_json::to_vec_pretty(map)?;
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Provision the default admin account on first run. The admin holds both
    /// global permissions so a fresh install can see and manage every record.
    pub fn ensure_default_admin(&self) -> Result<()> {
        if self.map.read().contains_key(DEFAULT_ADMIN_USER) {
            return Ok(());
        }
        self.add_user(
            DEFAULT_ADMIN_USER,
            DEFAULT_ADMIN_PASSWORD,
            &[Permission::SeeAny, Permission::ShareAny],
        )?;
        info!(target: "powtoon::security", "provisioned default admin user '{}'", DEFAULT_ADMIN_USER);
        Ok(())
    }

    /// Create or replace a user with the given password and grants.
    pub fn add_user(&self, username: &str, password: &str, perms: &[Permission]) -> Result<()> {
        let hash = hash_password(password)?;
        let mut map = self.map.write();
        map.insert(
            username.to_string(),
            UserRecord { password_hash: hash, permissions: perms.iter().copied().collect() },
        );
        self.persist(&map)
    }

    pub fn delete_user(&self, username: &str) -> Result<()> {
        let mut map = self.map.write();
        map.remove(username)
            .with_context(|| format!("no such user: {}", username))?;
        self.persist(&map)
    }

    pub fn grant(&self, username: &str, perm: Permission) -> Result<()> {
        let mut map = self.map.write();
        let rec = map
            .get_mut(username)
            .with_context(|| format!("no such user: {}", username))?;
        rec.permissions.insert(perm);
        self.persist(&map)
    }

    pub fn revoke(&self, username: &str, perm: Permission) -> Result<()> {
        let mut map = self.map.write();
        let rec = map
            .get_mut(username)
            .with_context(|| format!("no such user: {}", username))?;
        rec.permissions.remove(&perm);
        self.persist(&map)
    }

    /// Verify a password. Unknown usernames verify against nothing and fail.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let map = self.map.read();
        match map.get(username) {
            Some(rec) => verify_password(&rec.password_hash, password),
            None => false,
        }
    }

    /// Resolve the request principal for an authenticated username.
    pub fn principal_for(&self, username: &str) -> Option<Principal> {
        let map = self.map.read();
        map.get(username).map(|rec| Principal {
            user_id: username.to_string(),
            permissions: rec.permissions.clone(),
        })
    }
}

impl UserDirectory for Users {
    fn user_exists(&self, user: &str) -> bool {
        self.map.read().contains_key(user)
    }
}
