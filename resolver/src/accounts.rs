// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Local account database

use crate::identity::Uid;
use std::path::PathBuf;

/// A local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub uid: Uid,
    pub gid: u32,
    pub home: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Failed to look up account with uid {uid}: {reason}")]
    Lookup { uid: Uid, reason: String },
}

/// Maps uids to accounts.
pub trait UserDb: Send + Sync {
    /// Look up the account with id `uid`. `Ok(None)` if there is no such account.
    fn by_uid(&self, uid: Uid) -> Result<Option<Account>, AccountError>;
}

/// The system's account database (`getpwuid_r`).
#[derive(Debug, Default)]
pub struct SystemUserDb;

impl From<nix::unistd::User> for Account {
    fn from(user: nix::unistd::User) -> Self {
        Account {
            name: user.name,
            uid: Uid::new(user.uid.as_raw()),
            gid: user.gid.as_raw(),
            home: user.dir,
        }
    }
}

impl UserDb for SystemUserDb {
    fn by_uid(&self, uid: Uid) -> Result<Option<Account>, AccountError> {
        nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid.get()))
            .map(|user| user.map(Account::from))
            .map_err(|errno| AccountError::Lookup {
                uid,
                reason: errno.desc().to_string(),
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_system_superuser() {
        let root = SystemUserDb.by_uid(Uid::ROOT).unwrap().unwrap();
        assert_eq!(root.uid, Uid::ROOT);
        assert_eq!(root.name, "root");
    }

    #[test]
    fn test_system_unknown_uid() {
        assert_eq!(SystemUserDb.by_uid(Uid::new(u32::MAX - 7)).unwrap(), None);
    }
}
