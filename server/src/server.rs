// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Connection Server
//! - Waits on all listeners at once and accepts one connection per ready listener
//! - Caps concurrent sessions: a connection over the limit is closed right away, unanswered
//! - Runs each session as its own task with its own timeout; a panicking session only
//!   takes itself down
//! - Reaps every finished session in the accept loop, which owns the session counter
//! - Re-reads the configuration on request, ahead of pending connections; a configuration
//!   that fails to load stops the server

use crate::errors::{ServerError, SessionError};
use crate::session::{Outcome, SessionContext};
use config::{ConfigSource, IdentdConfig, SharedConfig};
use futures::StreamExt;
use futures::stream::{poll_fn, select_all};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

/// Asks a running [`IdentServer`] to reload its configuration.
#[derive(Clone, Debug)]
pub struct ReloadHandle(mpsc::Sender<()>);

impl ReloadHandle {
    /// Request a reload. Requests made while one is already pending are merged into it.
    pub fn request(&self) {
        if self.0.try_send(()).is_err() {
            debug!("A configuration reload is already pending");
        }
    }
}

pub struct IdentServer {
    listeners: Vec<Arc<TcpListener>>,
    context: Arc<SessionContext>,
    config: SharedConfig,
    source: ConfigSource,
    reload_tx: mpsc::Sender<()>,
    reload_rx: mpsc::Receiver<()>,
}

impl IdentServer {
    /// Build a server on already bound `listeners`. `config` is the configuration in effect;
    /// `source` is where it is re-read from on reload.
    pub fn new(
        listeners: Vec<TcpListener>,
        context: SessionContext,
        config: SharedConfig,
        source: ConfigSource,
    ) -> Result<Self, ServerError> {
        if listeners.is_empty() {
            return Err(ServerError::NoListener);
        }
        let (reload_tx, reload_rx) = mpsc::channel(1);
        Ok(Self {
            listeners: listeners.into_iter().map(Arc::new).collect(),
            context: Arc::new(context),
            config,
            source,
            reload_tx,
            reload_rx,
        })
    }

    #[must_use]
    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle(self.reload_tx.clone())
    }

    #[must_use]
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .collect()
    }

    /// Serve until `shutdown` completes, then wait for the sessions in flight.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let IdentServer {
            listeners,
            context,
            config,
            source,
            reload_tx: _reload_tx,
            mut reload_rx,
        } = self;

        for address in listeners.iter().filter_map(|l| l.local_addr().ok()) {
            info!("Listening on {address}");
        }
        let mut accepts = select_all(listeners.iter().map(|listener| {
            let listener = Arc::clone(listener);
            poll_fn(move |cx| listener.poll_accept(cx).map(Some))
        }));

        let mut sessions: JoinSet<Result<Outcome, SessionError>> = JoinSet::new();
        let mut active: usize = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutting down; {active} sessions in flight");
                    break;
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    active = active.saturating_sub(1);
                    reap(joined);
                }
                Some(()) = reload_rx.recv() => {
                    info!("Reloading configuration");
                    let fresh = source.load().inspect_err(|e| error!("{e}"))?;
                    config.replace(fresh);
                }
                Some(accepted) = accepts.next() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept a connection: {e}");
                            continue;
                        }
                    };
                    let snapshot = config.snapshot();
                    if active >= snapshot.connection_limit {
                        warn!("Rejecting {peer}: {active} sessions in flight");
                        drop(stream);
                        continue;
                    }
                    active = active.saturating_add(1);
                    let context = Arc::clone(&context);
                    sessions.spawn(
                        serve_connection(context, stream, peer, snapshot).instrument(info_span!("session", %peer)),
                    );
                }
            }
        }

        while let Some(joined) = sessions.join_next().await {
            reap(joined);
        }
        Ok(())
    }
}

async fn serve_connection(
    context: Arc<SessionContext>,
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<IdentdConfig>,
) -> Result<Outcome, SessionError> {
    let local = stream.local_addr()?;
    context.serve_bounded(stream, local, peer, &config).await
}

fn reap(joined: Result<Result<Outcome, SessionError>, JoinError>) {
    match joined {
        Ok(Ok(outcome)) => trace!("Session ended: {outcome}"),
        Ok(Err(e)) => debug!("Session failed: {e}"),
        Err(e) if e.is_panic() => error!("Session panicked: {e}"),
        Err(e) => warn!("Session did not complete: {e}"),
    }
}
