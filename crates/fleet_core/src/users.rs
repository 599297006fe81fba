//! User accounts and permissions.
//!
//! Passwords are never stored; each account keeps a SHA-256 digest of
//! `name:password`, so equal passwords of different users hash differently.
//! Every kernel operation requires one [`Permission`]; the kernel checks the
//! authenticated client's permission set before touching the model.

use std::collections::{BTreeSet, HashMap};

use sha2::{Digest, Sha256};

use crate::error::{KernelError, Result};

/// Granular permissions a user account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    ReadData,
    ModifyModel,
    ModifyOrder,
    ModifyVehicles,
    PublishMessages,
    ChangeKernelState,
    LoadSaveModel,
    ChangeConfiguration,
    ManageUsers,
}

impl Permission {
    pub fn all() -> PermissionSet {
        [
            Permission::ReadData,
            Permission::ModifyModel,
            Permission::ModifyOrder,
            Permission::ModifyVehicles,
            Permission::PublishMessages,
            Permission::ChangeKernelState,
            Permission::LoadSaveModel,
            Permission::ChangeConfiguration,
            Permission::ManageUsers,
        ]
        .into_iter()
        .collect()
    }
}

pub type PermissionSet = BTreeSet<Permission>;

#[derive(Debug, Clone)]
struct UserAccount {
    digest: [u8; 32],
    permissions: PermissionSet,
}

fn digest_for(name: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// The kernel's account store. Seeds a default "Alice" account with an empty
/// password and the full permission set, matching the stock deployment.
pub struct UserStore {
    accounts: HashMap<String, UserAccount>,
}

impl Default for UserStore {
    fn default() -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(
            "Alice".to_string(),
            UserAccount {
                digest: digest_for("Alice", ""),
                permissions: Permission::all(),
            },
        );
        Self { accounts }
    }
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies the credentials and returns the account's permission set.
    pub fn authenticate(&self, name: &str, password: &str) -> Result<PermissionSet> {
        let account = self
            .accounts
            .get(name)
            .ok_or_else(|| KernelError::Credentials(format!("unknown user {name}")))?;
        if account.digest != digest_for(name, password) {
            return Err(KernelError::Credentials(format!(
                "wrong password for user {name}"
            )));
        }
        Ok(account.permissions.clone())
    }

    pub fn permissions_of(&self, name: &str) -> Result<PermissionSet> {
        self.accounts
            .get(name)
            .map(|account| account.permissions.clone())
            .ok_or_else(|| KernelError::UserUnknown(name.to_string()))
    }

    pub fn create_user(
        &mut self,
        name: &str,
        password: &str,
        permissions: PermissionSet,
    ) -> Result<()> {
        if self.accounts.contains_key(name) {
            return Err(KernelError::UserExists(name.to_string()));
        }
        self.accounts.insert(
            name.to_string(),
            UserAccount {
                digest: digest_for(name, password),
                permissions,
            },
        );
        Ok(())
    }

    pub fn set_user_password(&mut self, name: &str, password: &str) -> Result<()> {
        let digest = digest_for(name, password);
        let account = self
            .accounts
            .get_mut(name)
            .ok_or_else(|| KernelError::UserUnknown(name.to_string()))?;
        account.digest = digest;
        Ok(())
    }

    pub fn set_user_permissions(&mut self, name: &str, permissions: PermissionSet) -> Result<()> {
        let account = self
            .accounts
            .get_mut(name)
            .ok_or_else(|| KernelError::UserUnknown(name.to_string()))?;
        account.permissions = permissions;
        Ok(())
    }

    pub fn remove_user(&mut self, name: &str) -> Result<()> {
        self.accounts
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| KernelError::UserUnknown(name.to_string()))
    }
}
