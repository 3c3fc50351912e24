// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory backends, for tests

#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

use crate::accounts::{Account, AccountError, UserDb};
use crate::errors::TableError;
use crate::forward::{ForwardError, ForwardQuery, ForwardedIdentity, Forwarder};
use crate::identity::Uid;
use crate::nat::{NatEntry, NatProtocol, NatRecords, NatTable};
use crate::table::{Family, SocketEntry, SocketState, SocketTable};
use async_trait::async_trait;
use parking_lot::Mutex;
use proto::{ConnectionTuple, IdentPort};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn socket_entry(local: &str, remote: &str, uid: u32, state: SocketState) -> SocketEntry {
    SocketEntry {
        local: SocketAddr::from_str(local).unwrap(),
        remote: SocketAddr::from_str(remote).unwrap(),
        state,
        owner: Uid::new(uid),
    }
}

/// A connected socket from `local` to `remote`, owned by `uid`.
pub fn connected(local: &str, remote: &str, uid: u32) -> SocketEntry {
    socket_entry(local, remote, uid, SocketState::Connected)
}

/// A listening socket.
pub fn listening(local: &str, remote: &str, uid: u32) -> SocketEntry {
    socket_entry(local, remote, uid, SocketState::Listening)
}

/// A connection tuple from textual addresses.
pub fn tuple(local: &str, local_port: u16, remote: &str, remote_port: u16) -> ConnectionTuple {
    ConnectionTuple::new(
        IpAddr::from_str(local).unwrap(),
        IdentPort::try_from(local_port).unwrap(),
        IpAddr::from_str(remote).unwrap(),
        IdentPort::try_from(remote_port).unwrap(),
    )
}

/// A TCP translation of `inside` to `outside`, talking to `remote`.
pub fn nat_entry(inside: &str, outside: &str, remote: &str) -> NatEntry {
    NatEntry {
        protocol: NatProtocol::Tcp,
        outside: SocketAddrV4::from_str(outside).unwrap(),
        remote: SocketAddrV4::from_str(remote).unwrap(),
        inside: SocketAddrV4::from_str(inside).unwrap(),
    }
}

/// A socket table with fixed content. Clones share the lookup counter.
#[derive(Debug, Clone)]
pub struct FixtureSocketTable {
    inet: Vec<SocketEntry>,
    inet6: Vec<SocketEntry>,
    available: bool,
    failing: bool,
    lookups: Arc<AtomicUsize>,
}

impl Default for FixtureSocketTable {
    fn default() -> Self {
        Self {
            inet: Vec::new(),
            inet6: Vec::new(),
            available: true,
            failing: false,
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FixtureSocketTable {
    pub fn new() -> Self {
        Self::default()
    }
    /// Add a record to the table of the family of its local address.
    #[must_use]
    pub fn with_entry(mut self, entry: SocketEntry) -> Self {
        match Family::of(entry.local.ip()) {
            Family::Inet => self.inet.push(entry),
            Family::Inet6 => self.inet6.push(entry),
        }
        self
    }
    /// Make every read fail.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
    /// How many times the table was read.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl SocketTable for FixtureSocketTable {
    fn available(&self) -> bool {
        self.available
    }
    fn entries(&self, family: Family) -> Result<Vec<SocketEntry>, TableError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if self.failing {
            return Err(TableError::Read {
                table: "fixture socket table",
                reason: "injected failure".to_string(),
            });
        }
        Ok(match family {
            Family::Inet => self.inet.clone(),
            Family::Inet6 => self.inet6.clone(),
        })
    }
}

/// A NAT table with fixed content. `None` records fail to be read.
#[derive(Debug)]
pub struct FixtureNatTable {
    records: Vec<Option<NatEntry>>,
    available: bool,
    traversals: AtomicUsize,
}

impl Default for FixtureNatTable {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            available: true,
            traversals: AtomicUsize::new(0),
        }
    }
}

impl FixtureNatTable {
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn with_entry(mut self, entry: NatEntry) -> Self {
        self.records.push(Some(entry));
        self
    }
    /// Add a record that fails to be read.
    #[must_use]
    pub fn with_read_error(mut self) -> Self {
        self.records.push(None);
        self
    }
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
    /// How many traversals were started.
    pub fn traversals(&self) -> usize {
        self.traversals.load(Ordering::Relaxed)
    }
}

impl NatTable for FixtureNatTable {
    fn available(&self) -> bool {
        self.available
    }
    fn records(&self) -> Result<NatRecords<'_>, TableError> {
        self.traversals.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(self.records.iter().map(|record| {
            record.clone().ok_or_else(|| TableError::Malformed {
                table: "fixture NAT table",
                record: "<unreadable>".to_string(),
            })
        })))
    }
}

/// A forwarder answering for a fixed set of inside hosts. Hosts it does not know
/// answer `NO-USER`.
#[derive(Debug, Default)]
pub struct FixtureForwarder {
    answers: HashMap<Ipv4Addr, ForwardedIdentity>,
    queries: Mutex<Vec<ForwardQuery>>,
}

impl FixtureForwarder {
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn answering(mut self, host: Ipv4Addr, user: &str, os: &str) -> Self {
        self.answers.insert(
            host,
            ForwardedIdentity {
                user: user.to_string(),
                os: os.to_string(),
            },
        );
        self
    }
    /// The queries received so far.
    pub fn queries(&self) -> Vec<ForwardQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Forwarder for FixtureForwarder {
    async fn forward(&self, query: &ForwardQuery) -> Result<ForwardedIdentity, ForwardError> {
        self.queries.lock().push(query.clone());
        self.answers
            .get(query.inside.ip())
            .cloned()
            .ok_or_else(|| ForwardError::Refused {
                server: query.server(),
                reason: "NO-USER".to_string(),
            })
    }
}

/// An account database with fixed content.
#[derive(Debug, Default, Clone)]
pub struct FixtureUserDb {
    accounts: Vec<Account>,
    failing: bool,
}

impl FixtureUserDb {
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn with_account(mut self, name: &str, uid: u32) -> Self {
        self.accounts.push(Account {
            name: name.to_string(),
            uid: Uid::new(uid),
            gid: uid,
            home: PathBuf::from(format!("/home/{name}")),
        });
        self
    }
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

impl UserDb for FixtureUserDb {
    fn by_uid(&self, uid: Uid) -> Result<Option<Account>, AccountError> {
        if self.failing {
            return Err(AccountError::Lookup {
                uid,
                reason: "injected failure".to_string(),
            });
        }
        Ok(self.accounts.iter().find(|account| account.uid == uid).cloned())
    }
}
