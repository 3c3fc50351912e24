// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resolution outcomes

use crate::errors::TableError;
use std::fmt::Display;

/// Numeric id of a local account. Uid 0 is a valid owner (the superuser); "no owner"
/// is expressed with [`Resolution::NotFound`], never with a reserved uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(u32);

impl Uid {
    pub const ROOT: Uid = Uid(0);

    #[must_use]
    pub fn new(raw: u32) -> Self {
        Uid(raw)
    }
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for Uid {
    fn from(raw: u32) -> Self {
        Uid(raw)
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who owns a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// The socket is owned by a local account.
    Local(Uid),
    /// The connection is masqueraded for a host behind the NAT; the identity was obtained
    /// from that host or from the static client table.
    Masqueraded { user: String, os: Option<String> },
}

/// The outcome of one backend lookup.
#[derive(Debug)]
pub enum Resolution {
    Found(Identity),
    NotFound,
    BackendError(TableError),
}

impl Resolution {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}
