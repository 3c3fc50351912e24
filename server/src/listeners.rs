// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Listening sockets

use crate::errors::ServerError;
use config::IdentdConfig;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpSocket};

#[allow(unused)]
use tracing::{debug, info};

const BACKLOG: u32 = 128;

fn bind(address: SocketAddr) -> Result<TcpListener, ServerError> {
    let open = || -> std::io::Result<TcpListener> {
        let socket = match address {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(address)?;
        socket.listen(BACKLOG)
    };
    let listener = open().map_err(|source| ServerError::Bind { address, source })?;
    debug!("Bound {address}");
    Ok(listener)
}

/// Open the listening sockets for `config`. Every configured address must be bound. Without
/// configured addresses, the IPv6 wildcard is tried first (it accepts IPv4 connections too),
/// then the IPv4 one.
pub fn bind_listeners(config: &IdentdConfig) -> Result<Vec<TcpListener>, ServerError> {
    if !config.listen.is_empty() {
        return config
            .listen
            .iter()
            .map(|address| bind(SocketAddr::new(*address, config.port)))
            .collect();
    }

    let mut failure = None;
    for address in config.listen_addresses() {
        match bind(SocketAddr::new(address, config.port)) {
            Ok(listener) => return Ok(vec![listener]),
            Err(e) => {
                debug!("{e}");
                failure = Some(e);
            }
        }
    }
    Err(failure.unwrap_or(ServerError::NoListener))
}
