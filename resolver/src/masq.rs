// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Masquerade Lookup: attribute a connection translated by this host to a host behind it

use crate::forward::{ForwardQuery, Forwarder};
use crate::identity::{Identity, Resolution};
use crate::errors::TableError;
use crate::nat::{NatEntry, NatTable};
use config::{IdentdConfig, NatPrecedence};
use proto::ConnectionTuple;
use std::net::IpAddr;
use std::sync::Arc;

#[allow(unused)]
use tracing::{debug, trace, warn};

/// Upper bound on the NAT records examined in one lookup.
pub const MAX_NAT_RECORDS: usize = 1 << 16;

/// The translations of `tuple` in one traversal of `table`, in table order. A record that
/// cannot be read is kept as the last item.
fn translations(
    table: &dyn NatTable,
    tuple: &ConnectionTuple,
    proxy: Option<IpAddr>,
) -> Result<Vec<Result<NatEntry, TableError>>, TableError> {
    let mut found = Vec::new();
    for record in table.records()?.take(MAX_NAT_RECORDS) {
        match record {
            Ok(entry) if entry.matches(tuple, proxy) => found.push(Ok(entry)),
            Ok(_) => {}
            Err(e) => {
                found.push(Err(e));
                break;
            }
        }
    }
    Ok(found)
}

pub struct MasqueradeLookup {
    table: Arc<dyn NatTable>,
    forwarder: Arc<dyn Forwarder>,
}

impl MasqueradeLookup {
    #[must_use]
    pub fn new(table: Arc<dyn NatTable>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self { table, forwarder }
    }

    #[must_use]
    pub fn available(&self) -> bool {
        self.table.available()
    }

    /// Look up the IPv4 `tuple` among the active translations. For every translation of
    /// the connection, the inside host is asked (if forwarding is on) or its static entry
    /// is used, in the configured order of precedence. A translation for which neither
    /// answers does not end the search. A record that cannot be read does.
    pub async fn lookup(&self, tuple: &ConnectionTuple, config: &IdentdConfig) -> Resolution {
        // the table is read off the async workers: it is file I/O behind a lock
        let table = Arc::clone(&self.table);
        let (query, proxy) = (*tuple, config.proxy);
        let records =
            match tokio::task::spawn_blocking(move || translations(table.as_ref(), &query, proxy))
                .await
            {
                Ok(Ok(records)) => records,
                Ok(Err(e)) => return Resolution::BackendError(e),
                Err(e) => {
                    return Resolution::BackendError(TableError::Read {
                        table: "NAT table",
                        reason: e.to_string(),
                    });
                }
            };

        for record in records {
            let entry = match record {
                Ok(entry) => entry,
                Err(e) => return Resolution::BackendError(e),
            };
            trace!("{tuple} is translated for {}", entry.inside);

            let client = config.nat.client_for(IpAddr::V4(*entry.inside.ip()));
            let from_client = || {
                client.map(|client| Identity::Masqueraded {
                    user: client.user.clone(),
                    os: client.os.clone(),
                })
            };
            if config.nat.precedence == NatPrecedence::Override
                && let Some(identity) = from_client()
            {
                return Resolution::Found(identity);
            }
            if config.nat.forward {
                let query = ForwardQuery {
                    inside: entry.inside,
                    remote_port: entry.remote.port(),
                    forward_port: config.nat.forward_port,
                    timeout: config.nat.forward_timeout(),
                };
                match self.forwarder.forward(&query).await {
                    Ok(forwarded) => {
                        return Resolution::Found(Identity::Masqueraded {
                            user: forwarded.user,
                            os: Some(forwarded.os),
                        });
                    }
                    Err(e) => debug!("Forwarding for {tuple} failed: {e}"),
                }
            }
            if let Some(identity) = from_client() {
                return Resolution::Found(identity);
            }
        }
        Resolution::NotFound
    }
}
