// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Direct Lookup: match a tuple against the kernel socket table

use crate::identity::{Identity, Resolution};
use crate::table::{Family, SocketEntry, SocketState, SocketTable};
use proto::ConnectionTuple;
use std::net::IpAddr;
use std::sync::Arc;

#[allow(unused)]
use tracing::{debug, trace, warn};

/// Upper bound on the records examined in one lookup.
pub const MAX_SOCKET_RECORDS: usize = 1 << 20;

/// Proxy relaxation: the query comes from the configured proxy, about a connection the proxy
/// relayed. The remote address stored in the socket table is then the one of the real peer,
/// not the proxy's, so only ports can be compared.
pub(crate) fn proxy_relaxed(tuple: &ConnectionTuple, proxy: Option<IpAddr>) -> bool {
    proxy.is_some_and(|proxy| tuple.remote_addr() == proxy && tuple.local_addr() != proxy)
}

fn matches(entry: &SocketEntry, tuple: &ConnectionTuple, relaxed: bool) -> bool {
    if entry.local.port() != tuple.local_port().get()
        || entry.remote.port() != tuple.remote_port().get()
    {
        return false;
    }
    relaxed || (entry.local.ip() == tuple.local_addr() && entry.remote.ip() == tuple.remote_addr())
}

pub struct DirectLookup {
    table: Arc<dyn SocketTable>,
}

impl DirectLookup {
    #[must_use]
    pub fn new(table: Arc<dyn SocketTable>) -> Self {
        Self { table }
    }

    #[must_use]
    pub fn available(&self) -> bool {
        self.table.available()
    }

    /// Look `tuple` up in the table of its address family. Only connected sockets are
    /// attributed; the first matching one wins.
    pub fn lookup(&self, tuple: &ConnectionTuple, proxy: Option<IpAddr>) -> Resolution {
        let family = Family::of(tuple.local_addr());
        let entries = match self.table.entries(family) {
            Ok(entries) => entries,
            Err(e) => return Resolution::BackendError(e),
        };
        if entries.len() > MAX_SOCKET_RECORDS {
            warn!(
                "Socket table has {} records; only the first {MAX_SOCKET_RECORDS} are examined",
                entries.len()
            );
        }
        let relaxed = proxy_relaxed(tuple, proxy);
        let found = entries
            .iter()
            .take(MAX_SOCKET_RECORDS)
            .filter(|entry| entry.state == SocketState::Connected)
            .find(|entry| matches(entry, tuple, relaxed));

        match found {
            Some(entry) => {
                trace!("{tuple} is owned by uid {}", entry.owner);
                Resolution::Found(Identity::Local(entry.owner))
            }
            None => Resolution::NotFound,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identity::Uid;
    use crate::testing::{FixtureSocketTable, connected, listening, tuple};
    use std::str::FromStr;

    fn lookup(table: FixtureSocketTable, tuple: &ConnectionTuple, proxy: Option<&str>) -> Resolution {
        let direct = DirectLookup::new(Arc::new(table));
        direct.lookup(tuple, proxy.map(|p| IpAddr::from_str(p).unwrap()))
    }

    #[test]
    fn test_exact_match() {
        let table = FixtureSocketTable::new()
            .with_entry(connected("10.0.0.1:4000", "10.0.0.2:23", 1001))
            .with_entry(connected("10.0.0.1:4321", "10.0.0.2:23", 1000));
        let query = tuple("10.0.0.1", 4321, "10.0.0.2", 23);
        let Resolution::Found(Identity::Local(uid)) = lookup(table, &query, None) else {
            panic!("expected a local owner");
        };
        assert_eq!(uid, Uid::new(1000));
    }

    #[test]
    fn test_superuser_is_a_valid_owner() {
        let table =
            FixtureSocketTable::new().with_entry(connected("10.0.0.1:4321", "10.0.0.2:23", 0));
        let query = tuple("10.0.0.1", 4321, "10.0.0.2", 23);
        let Resolution::Found(Identity::Local(uid)) = lookup(table, &query, None) else {
            panic!("expected a local owner");
        };
        assert_eq!(uid, Uid::ROOT);
    }

    #[test]
    fn test_unconnected_sockets_are_not_attributed() {
        let table = FixtureSocketTable::new()
            .with_entry(listening("10.0.0.1:4321", "10.0.0.2:23", 1000));
        let query = tuple("10.0.0.1", 4321, "10.0.0.2", 23);
        assert!(matches!(lookup(table, &query, None), Resolution::NotFound));
    }

    #[test]
    fn test_address_mismatch() {
        let table =
            FixtureSocketTable::new().with_entry(connected("10.0.0.1:4321", "10.0.0.3:23", 1000));
        let query = tuple("10.0.0.1", 4321, "10.0.0.2", 23);
        assert!(matches!(lookup(table, &query, None), Resolution::NotFound));
    }

    #[test]
    fn test_proxy_relaxation() {
        // the socket is connected to the real peer; the query comes from the proxy
        let table = FixtureSocketTable::new()
            .with_entry(connected("10.0.0.1:4321", "192.0.2.77:23", 1000));
        let query = tuple("10.0.0.1", 4321, "10.0.0.254", 23);

        let table2 = table.clone();
        assert!(matches!(lookup(table, &query, None), Resolution::NotFound));
        assert!(lookup(table2.clone(), &query, Some("10.0.0.254")).is_found());

        // a different proxy does not relax anything
        assert!(matches!(
            lookup(table2.clone(), &query, Some("10.0.0.253")),
            Resolution::NotFound
        ));

        // ports must still match
        let query = tuple("10.0.0.1", 4321, "10.0.0.254", 24);
        assert!(matches!(
            lookup(table2, &query, Some("10.0.0.254")),
            Resolution::NotFound
        ));
    }

    #[test]
    fn test_family_selects_table() {
        let table = FixtureSocketTable::new()
            .with_entry(connected("[::ffff:10.0.0.1]:4321", "[::ffff:10.0.0.2]:23", 1000));
        let v4 = tuple("10.0.0.1", 4321, "10.0.0.2", 23);
        let v6 = v4.mapped().unwrap();
        assert!(matches!(lookup(table.clone(), &v4, None), Resolution::NotFound));
        assert!(lookup(table, &v6, None).is_found());
    }

    #[test]
    fn test_backend_error() {
        let table = FixtureSocketTable::new().failing();
        let query = tuple("10.0.0.1", 4321, "10.0.0.2", 23);
        assert!(matches!(
            lookup(table, &query, None),
            Resolution::BackendError(_)
        ));
    }
}
