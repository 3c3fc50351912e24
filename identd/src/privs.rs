// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Dropping root privileges once the privileged resources are open

use nix::errno::Errno;
use nix::unistd::{Gid, Group, Uid, User, setgid, setgroups, setuid};
use tracing::info;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PrivilegeError {
    #[error("No such user: {0}")]
    UnknownUser(String),
    #[error("No such group: {0}")]
    UnknownGroup(String),
    #[error("Failed to look up {what} '{name}': {}", .errno.desc())]
    Lookup {
        what: &'static str,
        name: String,
        errno: Errno,
    },
    #[error("Failed to {what}: {}", .errno.desc())]
    #[diagnostic(help("privileges can only be dropped when started as root"))]
    Change { what: &'static str, errno: Errno },
}

/// The identity to switch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: Option<Uid>,
    pub gid: Option<Gid>,
}

fn lookup_user(name: &str) -> Result<User, PrivilegeError> {
    User::from_name(name)
        .map_err(|errno| PrivilegeError::Lookup {
            what: "user",
            name: name.to_string(),
            errno,
        })?
        .ok_or_else(|| PrivilegeError::UnknownUser(name.to_string()))
}

fn lookup_group(name: &str) -> Result<Group, PrivilegeError> {
    Group::from_name(name)
        .map_err(|errno| PrivilegeError::Lookup {
            what: "group",
            name: name.to_string(),
            errno,
        })?
        .ok_or_else(|| PrivilegeError::UnknownGroup(name.to_string()))
}

/// Resolve the user and group names given on the command line. Without an explicit group,
/// the user's primary group is used. `None` if there is nothing to switch to.
pub fn resolve(user: Option<&str>, group: Option<&str>) -> Result<Option<Credentials>, PrivilegeError> {
    let user = user.map(lookup_user).transpose()?;
    let group = group.map(lookup_group).transpose()?;
    let gid = group
        .map(|group| group.gid)
        .or_else(|| user.as_ref().map(|user| user.gid));
    let uid = user.map(|user| user.uid);
    if uid.is_none() && gid.is_none() {
        return Ok(None);
    }
    Ok(Some(Credentials { uid, gid }))
}

/// Switch to `credentials`: group first, while still allowed to, then user.
pub fn drop_privileges(credentials: Credentials) -> Result<(), PrivilegeError> {
    if let Some(gid) = credentials.gid {
        setgroups(&[gid]).map_err(|errno| PrivilegeError::Change {
            what: "set supplementary groups",
            errno,
        })?;
        setgid(gid).map_err(|errno| PrivilegeError::Change {
            what: "set group id",
            errno,
        })?;
    }
    if let Some(uid) = credentials.uid {
        setuid(uid).map_err(|errno| PrivilegeError::Change {
            what: "set user id",
            errno,
        })?;
    }
    info!(
        "Running as uid {} gid {}",
        nix::unistd::getuid(),
        nix::unistd::getgid()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve() {
        assert_eq!(resolve(None, None).unwrap(), None);

        let root = resolve(Some("root"), None).unwrap().unwrap();
        assert_eq!(root.uid, Some(Uid::from_raw(0)));
        assert_eq!(root.gid, Some(Gid::from_raw(0)));

        let group_only = resolve(None, Some("root")).unwrap().unwrap();
        assert_eq!(group_only.uid, None);
        assert_eq!(group_only.gid, Some(Gid::from_raw(0)));
    }

    #[test]
    fn test_resolve_unknown_names() {
        assert!(matches!(
            resolve(Some("no-such-user-for-identd"), None),
            Err(PrivilegeError::UnknownUser(_))
        ));
        assert!(matches!(
            resolve(None, Some("no-such-group-for-identd")),
            Err(PrivilegeError::UnknownGroup(_))
        ));
    }
}
