// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Forward-proxy client: relay an ident query to the host behind the NAT

use async_trait::async_trait;
use proto::{MAX_LINE_LEN, ParsedReply, ReplyParseError, Request, parse_reply};
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[allow(unused)]
use tracing::{debug, trace};

/// A query to relay: which connection to ask the inside host about, and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardQuery {
    /// The inside host's end of the masqueraded connection.
    pub inside: SocketAddrV4,
    /// The port the remote peer uses for the connection.
    pub remote_port: u16,
    /// Port the inside host's ident server listens on.
    pub forward_port: u16,
    /// Bound on the whole exchange.
    pub timeout: Duration,
}

impl ForwardQuery {
    #[must_use]
    pub fn server(&self) -> SocketAddr {
        SocketAddr::from(SocketAddrV4::new(*self.inside.ip(), self.forward_port))
    }
}

/// The identity the inside host reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedIdentity {
    pub user: String,
    pub os: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Could not connect to {server}: {source}")]
    Connect {
        server: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error talking to {server}: {source}")]
    Io {
        server: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("{server} did not answer within {timeout:?}")]
    Timeout {
        server: SocketAddr,
        timeout: Duration,
    },
    #[error("{0} closed the connection without answering")]
    Closed(SocketAddr),
    #[error("{server} sent an invalid reply: {source}")]
    BadReply {
        server: SocketAddr,
        #[source]
        source: ReplyParseError,
    },
    #[error("{server} answered with error {reason}")]
    Refused { server: SocketAddr, reason: String },
    #[error("{server} answered about ports {got:?} instead of {expected:?}")]
    Mismatch {
        server: SocketAddr,
        expected: (i64, i64),
        got: (i64, i64),
    },
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, query: &ForwardQuery) -> Result<ForwardedIdentity, ForwardError>;
}

/// Relays queries over TCP to the ident server of the inside host.
#[derive(Debug, Default, Clone)]
pub struct ForwardClient;

impl ForwardClient {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn exchange(query: &ForwardQuery) -> Result<ForwardedIdentity, ForwardError> {
        let server = query.server();
        let stream = TcpStream::connect(server)
            .await
            .map_err(|source| ForwardError::Connect { server, source })?;
        let (reader, mut writer) = stream.into_split();

        let line = format!("{} , {}\r\n", query.inside.port(), query.remote_port);
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|source| ForwardError::Io { server, source })?;

        let mut reader = BufReader::new(reader).take(MAX_LINE_LEN as u64);
        let mut buffer = Vec::with_capacity(128);
        let read = reader
            .read_until(b'\n', &mut buffer)
            .await
            .map_err(|source| ForwardError::Io { server, source })?;
        if read == 0 {
            return Err(ForwardError::Closed(server));
        }
        let answer = String::from_utf8_lossy(&buffer);
        trace!("{server} answered {:?}", answer.trim_end());

        let expected = Request {
            local: i64::from(query.inside.port()),
            remote: i64::from(query.remote_port),
        };
        let check = |request: Request| {
            if request == expected {
                Ok(())
            } else {
                Err(ForwardError::Mismatch {
                    server,
                    expected: (expected.local, expected.remote),
                    got: (request.local, request.remote),
                })
            }
        };
        match parse_reply(&answer).map_err(|source| ForwardError::BadReply { server, source })? {
            ParsedReply::UserId {
                request, os, user, ..
            } => {
                check(request)?;
                Ok(ForwardedIdentity { user, os })
            }
            ParsedReply::Error { request, reason } => {
                check(request)?;
                Err(ForwardError::Refused { server, reason })
            }
        }
    }
}

#[async_trait]
impl Forwarder for ForwardClient {
    async fn forward(&self, query: &ForwardQuery) -> Result<ForwardedIdentity, ForwardError> {
        debug!(
            "Forwarding query for port {} to {}",
            query.inside.port(),
            query.server()
        );
        tokio::time::timeout(query.timeout, Self::exchange(query))
            .await
            .map_err(|_| ForwardError::Timeout {
                server: query.server(),
                timeout: query.timeout,
            })?
    }
}
