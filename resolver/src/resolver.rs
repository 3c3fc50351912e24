// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Identity Resolver: chains the lookup backends

use crate::direct::DirectLookup;
use crate::errors::ResolverError;
use crate::forward::Forwarder;
use crate::identity::{Identity, Resolution};
use crate::masq::MasqueradeLookup;
use crate::nat::NatTable;
use crate::table::SocketTable;
use config::IdentdConfig;
use proto::ConnectionTuple;
use std::sync::Arc;

#[allow(unused)]
use tracing::{debug, info, trace, warn};

/// Finds who owns a connection. Direct Lookup is tried first, for the tuple as given and for
/// its alternate family form; Masquerade Lookup comes last, for IPv4 connections only.
/// Backend failures are logged and count as "not found".
pub struct IdentityResolver {
    direct: DirectLookup,
    masq: Option<MasqueradeLookup>,
}

impl IdentityResolver {
    /// Build a resolver on top of the socket table. Fails if the table cannot be read on this
    /// host, since nothing could ever be resolved.
    pub fn new(sockets: Arc<dyn SocketTable>) -> Result<Self, ResolverError> {
        let direct = DirectLookup::new(sockets);
        if !direct.available() {
            return Err(ResolverError::SocketTableUnavailable);
        }
        Ok(Self { direct, masq: None })
    }

    /// Enable Masquerade Lookup. If NAT state cannot be read on this host, masquerade
    /// support is left off and the resolver keeps working with Direct Lookup alone.
    #[must_use]
    pub fn with_masquerade(mut self, nat: Arc<dyn NatTable>, forwarder: Arc<dyn Forwarder>) -> Self {
        let masq = MasqueradeLookup::new(nat, forwarder);
        if masq.available() {
            debug!("Masquerade lookup enabled");
            self.masq = Some(masq);
        } else {
            warn!("NAT state is not readable on this host: masquerade lookup disabled");
        }
        self
    }

    #[must_use]
    pub fn masquerade_available(&self) -> bool {
        self.masq.is_some()
    }

    fn settle(tuple: &ConnectionTuple, backend: &str, resolution: Resolution) -> Option<Identity> {
        match resolution {
            Resolution::Found(identity) => Some(identity),
            Resolution::NotFound => None,
            Resolution::BackendError(e) => {
                warn!("{backend} lookup for {tuple} failed: {e}");
                None
            }
        }
    }

    /// Resolve the owner of `tuple` under the configuration snapshot `config`.
    pub async fn resolve(&self, tuple: &ConnectionTuple, config: &IdentdConfig) -> Option<Identity> {
        for candidate in std::iter::once(*tuple).chain(tuple.alternate()) {
            let resolution = self.direct.lookup(&candidate, config.proxy);
            if let Some(identity) = Self::settle(&candidate, "Direct", resolution) {
                return Some(identity);
            }
        }

        if !config.nat.enabled {
            return None;
        }
        let (Some(masq), Some(v4)) = (&self.masq, tuple.as_ipv4()) else {
            return None;
        };
        let resolution = masq.lookup(&v4, config).await;
        Self::settle(&v4, "Masquerade", resolution)
    }
}
