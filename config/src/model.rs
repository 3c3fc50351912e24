// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration model, as read from the YAML configuration file

use crate::errors::ConfigError;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 113;
pub const DEFAULT_CONNECTION_LIMIT: usize = 20;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_OS: &str = "UNIX";
pub const DEFAULT_CONNTRACK_PATH: &str = "/proc/net/nf_conntrack";

/// What to disclose for a local account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct UserPolicy {
    /// Never disclose this account: answer `HIDDEN-USER`.
    pub hidden: bool,
    /// Identifier to report instead of the account name.
    pub reply: Option<String>,
}

/// Which source wins when both forwarding and the static client table can answer
/// for a host behind the NAT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NatPrecedence {
    #[default]
    Forward,
    Override,
}

/// A statically known host (or network) behind the NAT and the identity to report for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MasqClient {
    pub network: IpNet,
    pub user: String,
    #[serde(default)]
    pub os: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct NatConfig {
    pub enabled: bool,
    /// Connection tracking table to read NAT mappings from.
    pub conntrack: PathBuf,
    /// Relay queries to the inside host.
    pub forward: bool,
    pub forward_port: u16,
    /// Seconds.
    pub forward_timeout: u64,
    pub precedence: NatPrecedence,
    pub clients: Vec<MasqClient>,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            conntrack: PathBuf::from(DEFAULT_CONNTRACK_PATH),
            forward: false,
            forward_port: DEFAULT_PORT,
            forward_timeout: DEFAULT_FORWARD_TIMEOUT_SECS,
            precedence: NatPrecedence::default(),
            clients: Vec::new(),
        }
    }
}

impl NatConfig {
    /// The first configured client whose network contains `address`.
    #[must_use]
    pub fn client_for(&self, address: IpAddr) -> Option<&MasqClient> {
        self.clients
            .iter()
            .find(|client| client.network.contains(&address))
    }
    #[must_use]
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout)
    }
}

/// Top-level configuration object for the ident daemon
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct IdentdConfig {
    /// Addresses to listen on. Empty means the IPv6 wildcard, or the IPv4 one if IPv6 is unavailable.
    pub listen: Vec<IpAddr>,
    pub port: u16,
    pub connection_limit: usize,
    /// Seconds a session may live before it is torn down.
    pub timeout: u64,
    /// Operating system token written in `USERID` replies.
    pub os: String,
    /// Identifier to report when no owner is found, instead of `NO-USER`.
    pub fallback_user: Option<String>,
    /// Address of a known proxy relaying connections on behalf of others.
    pub proxy: Option<IpAddr>,
    pub default_policy: UserPolicy,
    pub users: BTreeMap<String, UserPolicy>,
    pub nat: NatConfig,
}

impl Default for IdentdConfig {
    fn default() -> Self {
        Self {
            listen: Vec::new(),
            port: DEFAULT_PORT,
            connection_limit: DEFAULT_CONNECTION_LIMIT,
            timeout: DEFAULT_TIMEOUT_SECS,
            os: DEFAULT_OS.to_string(),
            fallback_user: None,
            proxy: None,
            default_policy: UserPolicy::default(),
            users: BTreeMap::new(),
            nat: NatConfig::default(),
        }
    }
}

/// Strings that end up on the wire must not break the reply syntax.
fn check_token(what: &str, token: &str) -> Result<(), ConfigError> {
    if token.is_empty() {
        return Err(ConfigError::Invalid(format!("{what} must not be empty")));
    }
    if token.contains([':', ',', '\r', '\n']) {
        return Err(ConfigError::Invalid(format!(
            "{what} '{}' contains a reserved character",
            token.escape_debug()
        )));
    }
    Ok(())
}

impl IdentdConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(yaml)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// The addresses to bind, in order of preference.
    #[must_use]
    pub fn listen_addresses(&self) -> Vec<IpAddr> {
        if self.listen.is_empty() {
            vec![
                IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ]
        } else {
            self.listen.clone()
        }
    }

    /// The disclosure policy for the account named `name`.
    #[must_use]
    pub fn policy_for(&self, name: &str) -> &UserPolicy {
        self.users.get(name).unwrap_or(&self.default_policy)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.connection_limit == 0 {
            return Err(ConfigError::Invalid(
                "connection-limit must be non-zero".to_string(),
            ));
        }
        if self.timeout == 0 {
            return Err(ConfigError::Invalid("timeout must be non-zero".to_string()));
        }
        check_token("os", &self.os)?;
        if let Some(user) = &self.fallback_user {
            check_token("fallback-user", user)?;
        }
        if let Some(reply) = &self.default_policy.reply {
            check_token("default-policy reply", reply)?;
        }
        for (name, policy) in &self.users {
            if let Some(reply) = &policy.reply {
                check_token(&format!("reply for user '{name}'"), reply)?;
            }
        }
        if self.nat.forward_port == 0 {
            return Err(ConfigError::Invalid(
                "nat forward-port must be non-zero".to_string(),
            ));
        }
        if self.nat.forward_timeout == 0 {
            return Err(ConfigError::Invalid(
                "nat forward-timeout must be non-zero".to_string(),
            ));
        }
        for client in &self.nat.clients {
            check_token(&format!("user for NAT client {}", client.network), &client.user)?;
            if let Some(os) = &client.os {
                check_token(&format!("os for NAT client {}", client.network), os)?;
            }
        }
        Ok(())
    }
}
