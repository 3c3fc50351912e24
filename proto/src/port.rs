// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Protocol-visible TCP ports

use std::fmt::Display;
use std::num::NonZero;

/// A TCP port as carried in an ident request. Port 0 is not a valid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentPort(NonZero<u16>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("port {0} is out of range (1-65535)")]
pub struct InvalidPort(pub i64);

impl IdentPort {
    /// Build an [`IdentPort`] from a value as parsed off the wire.
    pub fn new_checked(value: i64) -> Result<Self, InvalidPort> {
        u16::try_from(value)
            .ok()
            .and_then(NonZero::new)
            .map(Self)
            .ok_or(InvalidPort(value))
    }

    #[must_use]
    pub fn get(self) -> u16 {
        self.0.get()
    }
}

impl TryFrom<u16> for IdentPort {
    type Error = InvalidPort;
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new_checked(i64::from(value))
    }
}

impl From<IdentPort> for u16 {
    fn from(port: IdentPort) -> Self {
        port.get()
    }
}

impl Display for IdentPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
