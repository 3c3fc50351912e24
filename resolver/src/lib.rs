// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Identity resolution: find out which account owns the local end of a TCP connection,
//! either directly from the kernel socket table or, for masqueraded connections, from
//! the connection tracking table and the hosts behind the NAT.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod accounts;
mod direct;
mod errors;
mod forward;
mod identity;
mod masq;
mod nat;
mod resolver;
mod table;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use accounts::{Account, AccountError, SystemUserDb, UserDb};
pub use direct::{DirectLookup, MAX_SOCKET_RECORDS};
pub use errors::{ResolverError, TableError};
pub use forward::{ForwardClient, ForwardError, ForwardQuery, ForwardedIdentity, Forwarder};
pub use identity::{Identity, Resolution, Uid};
pub use masq::{MAX_NAT_RECORDS, MasqueradeLookup};
pub use nat::{ConntrackTable, NatEntry, NatProtocol, NatRecords, NatTable};
pub use resolver::IdentityResolver;
pub use table::{Family, ProcSocketTable, SocketEntry, SocketState, SocketTable};
