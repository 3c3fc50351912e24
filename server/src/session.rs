// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Protocol Handler: one request, one reply (or none), per connection

use crate::errors::SessionError;
use config::IdentdConfig;
use proto::{ConnectionTuple, ErrorReason, MAX_LINE_LEN, Reply, Request, parse_request};
use resolver::{Identity, IdentityResolver, UserDb};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

#[allow(unused)]
use tracing::{debug, info, trace, warn};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Outcome {
    /// The peer sent no complete line.
    NoRequest,
    /// The line is not a request: no reply.
    Malformed,
    InvalidPort,
    /// Owned by a local account.
    Local,
    /// Owned by a host behind the NAT.
    Masqueraded,
    /// Owner unknown, the fallback identity was reported.
    Fallback,
    NoUser,
    HiddenUser,
    UnknownError,
}

/// Everything a session needs besides its configuration snapshot.
pub struct SessionContext {
    resolver: Arc<IdentityResolver>,
    users: Arc<dyn UserDb>,
}

impl SessionContext {
    #[must_use]
    pub fn new(resolver: Arc<IdentityResolver>, users: Arc<dyn UserDb>) -> Self {
        Self { resolver, users }
    }

    /// Serve one session on `stream`, giving up after the configured timeout. If the timeout
    /// elapses nothing more is written, whatever the stage.
    pub async fn serve_bounded<S>(
        &self,
        stream: S,
        local: SocketAddr,
        peer: SocketAddr,
        config: &IdentdConfig,
    ) -> Result<Outcome, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let limit = config.timeout();
        tokio::time::timeout(limit, self.serve(stream, local, peer, config))
            .await
            .map_err(|_| {
                debug!("{peer}: session timed out");
                SessionError::Timeout(limit)
            })?
    }

    /// Serve one session on `stream`: read a request, resolve, reply. `local` and `peer` are
    /// the addresses of the two ends of the connection the query came in on.
    pub async fn serve<S>(
        &self,
        mut stream: S,
        local: SocketAddr,
        peer: SocketAddr,
        config: &IdentdConfig,
    ) -> Result<Outcome, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut line = Vec::with_capacity(64);
        let read = BufReader::new(&mut stream)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 || !line.ends_with(b"\n") {
            let outcome = if read >= MAX_LINE_LEN {
                Outcome::Malformed
            } else {
                Outcome::NoRequest
            };
            debug!("{peer}: no complete request line ({read} bytes): {outcome}");
            return Ok(outcome);
        }

        let line = String::from_utf8_lossy(&line);
        let request = match parse_request(&line) {
            Ok(request) => request,
            Err(e) => {
                debug!("{peer}: {e}");
                return Ok(Outcome::Malformed);
            }
        };

        let (reply, outcome) = match request.ports() {
            Err(e) => {
                info!(
                    "{peer}: {},{}: {e}: {}",
                    request.local,
                    request.remote,
                    Outcome::InvalidPort
                );
                (
                    Reply::error(request, ErrorReason::InvalidPort),
                    Outcome::InvalidPort,
                )
            }
            Ok(ports) => {
                let tuple = ConnectionTuple::new(local.ip(), ports.local, peer.ip(), ports.remote);
                let (reply, outcome) = self.answer(request, &tuple, config).await;
                info!("{peer}: {tuple}: {outcome}");
                (reply, outcome)
            }
        };

        stream.write_all(reply.to_string().as_bytes()).await?;
        stream.shutdown().await?;
        Ok(outcome)
    }

    async fn answer(
        &self,
        request: Request,
        tuple: &ConnectionTuple,
        config: &IdentdConfig,
    ) -> (Reply, Outcome) {
        match self.resolver.resolve(tuple, config).await {
            Some(Identity::Local(uid)) => match self.users.by_uid(uid) {
                Ok(Some(account)) => {
                    let policy = config.policy_for(&account.name);
                    if policy.hidden {
                        trace!("'{}' is hidden", account.name);
                        return (
                            Reply::error(request, ErrorReason::HiddenUser),
                            Outcome::HiddenUser,
                        );
                    }
                    let user = policy.reply.as_deref().unwrap_or(&account.name);
                    (Reply::user_id(request, &config.os, user), Outcome::Local)
                }
                Ok(None) => {
                    debug!("uid {uid} owns {tuple} but has no account");
                    (Reply::error(request, ErrorReason::NoUser), Outcome::NoUser)
                }
                Err(e) => {
                    warn!("{e}");
                    (
                        Reply::error(request, ErrorReason::UnknownError),
                        Outcome::UnknownError,
                    )
                }
            },
            Some(Identity::Masqueraded { user, os }) => (
                Reply::user_id(request, os.unwrap_or_else(|| config.os.clone()), user),
                Outcome::Masqueraded,
            ),
            None => match &config.fallback_user {
                Some(fallback) => (
                    Reply::user_id(request, &config.os, fallback),
                    Outcome::Fallback,
                ),
                None => (Reply::error(request, ErrorReason::NoUser), Outcome::NoUser),
            },
        }
    }
}
