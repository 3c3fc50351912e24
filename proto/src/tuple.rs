// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Connection four-tuples and IPv4/IPv6-mapped normalization

use crate::port::IdentPort;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};

/// The four-tuple of the connection an ident query asks about, seen from this host.
/// Fields are private: a tuple is never mutated once built, only re-expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionTuple {
    local_addr: IpAddr,
    local_port: IdentPort,
    remote_addr: IpAddr,
    remote_port: IdentPort,
}

impl ConnectionTuple {
    #[must_use]
    pub fn new(
        local_addr: IpAddr,
        local_port: IdentPort,
        remote_addr: IpAddr,
        remote_port: IdentPort,
    ) -> Self {
        Self {
            local_addr,
            local_port,
            remote_addr,
            remote_port,
        }
    }

    #[must_use]
    pub fn local_addr(&self) -> IpAddr {
        self.local_addr
    }
    #[must_use]
    pub fn local_port(&self) -> IdentPort {
        self.local_port
    }
    #[must_use]
    pub fn remote_addr(&self) -> IpAddr {
        self.remote_addr
    }
    #[must_use]
    pub fn remote_port(&self) -> IdentPort {
        self.remote_port
    }
    #[must_use]
    pub fn local(&self) -> SocketAddr {
        SocketAddr::new(self.local_addr, self.local_port.get())
    }
    #[must_use]
    pub fn remote(&self) -> SocketAddr {
        SocketAddr::new(self.remote_addr, self.remote_port.get())
    }

    /// True if both addresses are plain IPv4 addresses.
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        self.local_addr.is_ipv4() && self.remote_addr.is_ipv4()
    }

    /// Re-express an IPv6 tuple carrying IPv4-mapped addresses (`::ffff:a.b.c.d`) in IPv4 form.
    /// Returns `None` unless both addresses are mapped.
    #[must_use]
    pub fn unmapped(&self) -> Option<Self> {
        let (IpAddr::V6(local), IpAddr::V6(remote)) = (self.local_addr, self.remote_addr) else {
            return None;
        };
        let local = local.to_ipv4_mapped()?;
        let remote = remote.to_ipv4_mapped()?;
        Some(Self {
            local_addr: IpAddr::V4(local),
            remote_addr: IpAddr::V4(remote),
            ..*self
        })
    }

    /// Re-express an IPv4 tuple in IPv4-mapped IPv6 form.
    #[must_use]
    pub fn mapped(&self) -> Option<Self> {
        let (IpAddr::V4(local), IpAddr::V4(remote)) = (self.local_addr, self.remote_addr) else {
            return None;
        };
        Some(Self {
            local_addr: IpAddr::V6(local.to_ipv6_mapped()),
            remote_addr: IpAddr::V6(remote.to_ipv6_mapped()),
            ..*self
        })
    }

    /// The IPv4 form of this tuple, if it has one.
    #[must_use]
    pub fn as_ipv4(&self) -> Option<Self> {
        if self.is_ipv4() {
            Some(*self)
        } else {
            self.unmapped()
        }
    }

    /// The alternate family representation of this tuple: IPv4 for a mapped IPv6 tuple, mapped IPv6
    /// for an IPv4 tuple. Native IPv6 tuples have none.
    #[must_use]
    pub fn alternate(&self) -> Option<Self> {
        self.unmapped().or_else(|| self.mapped())
    }
}

impl Display for ConnectionTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.local(), self.remote())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn tuple(local: &str, lport: u16, remote: &str, rport: u16) -> ConnectionTuple {
        ConnectionTuple::new(
            IpAddr::from_str(local).unwrap(),
            IdentPort::try_from(lport).unwrap(),
            IpAddr::from_str(remote).unwrap(),
            IdentPort::try_from(rport).unwrap(),
        )
    }

    #[test]
    fn test_mapped_round_trip() {
        let v6 = tuple("::ffff:10.0.0.1", 4321, "::ffff:10.0.0.2", 23);
        let v4 = v6.unmapped().unwrap();
        assert_eq!(v4, tuple("10.0.0.1", 4321, "10.0.0.2", 23));
        assert!(v4.is_ipv4());
        assert_eq!(v4.mapped().unwrap(), v6);
        assert_eq!(v6.alternate(), Some(v4));
        assert_eq!(v4.alternate(), Some(v6));
        assert_eq!(v6.as_ipv4(), Some(v4));
    }

    #[test]
    fn test_native_v6_has_no_alternate() {
        let v6 = tuple("2001:db8::1", 4321, "2001:db8::2", 23);
        assert_eq!(v6.unmapped(), None);
        assert_eq!(v6.mapped(), None);
        assert_eq!(v6.alternate(), None);
        assert_eq!(v6.as_ipv4(), None);

        // only one side mapped: not an IPv4 connection
        let half = tuple("::ffff:10.0.0.1", 4321, "2001:db8::2", 23);
        assert_eq!(half.unmapped(), None);
    }

    #[test]
    fn test_display() {
        let t = tuple("10.0.0.1", 4321, "10.0.0.2", 23);
        assert_eq!(t.to_string(), "10.0.0.1:4321 <-> 10.0.0.2:23");
    }
}
