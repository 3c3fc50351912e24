// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel socket table: where Direct Lookup reads socket ownership from

use crate::errors::TableError;
use crate::identity::Uid;
use procfs::ProcError;
use procfs::net::{TcpNetEntry, TcpState};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

#[allow(unused)]
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Inet,
    Inet6,
}

impl Family {
    #[must_use]
    pub fn of(address: IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => Family::Inet,
            IpAddr::V6(_) => Family::Inet6,
        }
    }
}

/// The part of a socket's state that matters for attribution. Only connected sockets
/// are ever attributed to their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connected,
    Listening,
    Other,
}

/// One record of the kernel TCP socket table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub state: SocketState,
    pub owner: Uid,
}

impl From<&TcpNetEntry> for SocketEntry {
    fn from(entry: &TcpNetEntry) -> Self {
        let state = match entry.state {
            TcpState::Established => SocketState::Connected,
            TcpState::Listen => SocketState::Listening,
            _ => SocketState::Other,
        };
        SocketEntry {
            local: entry.local_address,
            remote: entry.remote_address,
            state,
            owner: Uid::new(entry.uid),
        }
    }
}

/// A read-only source of live TCP socket records.
pub trait SocketTable: Send + Sync {
    /// Tell if the table can be read at all on this host. Checked once at startup.
    fn available(&self) -> bool {
        true
    }
    /// Read a fresh snapshot of the records of a family.
    fn entries(&self, family: Family) -> Result<Vec<SocketEntry>, TableError>;
}

/// The Linux socket table, as exposed in `/proc/net/tcp` and `/proc/net/tcp6`.
#[derive(Debug, Default)]
pub struct ProcSocketTable;

const PROC_TCP: &str = "/proc/net/tcp";

impl SocketTable for ProcSocketTable {
    fn available(&self) -> bool {
        Path::new(PROC_TCP).exists()
    }

    fn entries(&self, family: Family) -> Result<Vec<SocketEntry>, TableError> {
        let (table, entries) = match family {
            Family::Inet => ("tcp table", procfs::net::tcp()),
            Family::Inet6 => ("tcp6 table", procfs::net::tcp6()),
        };
        match entries {
            Ok(entries) => {
                trace!("Read {} records from the {table}", entries.len());
                Ok(entries.iter().map(SocketEntry::from).collect())
            }
            // no IPv6 on this host: nothing can be owned there
            Err(ProcError::NotFound(_)) if family == Family::Inet6 => {
                debug!("No {table} on this host");
                Ok(Vec::new())
            }
            Err(e) => Err(TableError::Read {
                table,
                reason: e.to_string(),
            }),
        }
    }
}
