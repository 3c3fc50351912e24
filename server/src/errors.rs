// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use config::ConfigError;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to listen on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("No address to listen on")]
    NoListener,
    #[error("Failed to reload the configuration: {0}")]
    Reload(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session timed out after {0:?}")]
    Timeout(Duration),
}
