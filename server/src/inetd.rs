// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! inetd mode: serve the one connection handed over by a super-server

use crate::errors::SessionError;
use crate::session::{Outcome, SessionContext};
use config::IdentdConfig;
use tokio::net::TcpStream;
use tracing::{Instrument, info_span};

/// Serve a single session on an already-connected socket.
pub async fn serve_inherited(
    context: &SessionContext,
    stream: std::net::TcpStream,
    config: &IdentdConfig,
) -> Result<Outcome, SessionError> {
    stream.set_nonblocking(true)?;
    let stream = TcpStream::from_std(stream)?;
    let local = stream.local_addr()?;
    let peer = stream.peer_addr()?;
    context
        .serve_bounded(stream, local, peer, config)
        .instrument(info_span!("session", %peer))
        .await
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use resolver::IdentityResolver;
    use resolver::testing::{FixtureSocketTable, FixtureUserDb, connected};
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_serve_inherited_socket() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        let accepted = accepted.into_std().unwrap();

        // the connection the client asks about is the query connection itself
        let client_addr = client.local_addr().unwrap();
        let server_addr = accepted.local_addr().unwrap();
        let sockets = FixtureSocketTable::new().with_entry(connected(
            &server_addr.to_string(),
            &client_addr.to_string(),
            1000,
        ));
        let resolver = IdentityResolver::new(Arc::new(sockets)).unwrap();
        let context = SessionContext::new(
            Arc::new(resolver),
            Arc::new(FixtureUserDb::new().with_account("alice", 1000)),
        );

        let request = format!("{} , {}\r\n", server_addr.port(), client_addr.port());
        client.write_all(request.as_bytes()).await.unwrap();

        let outcome = serve_inherited(&context, accepted, &IdentdConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Local);

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert_eq!(
            reply,
            format!(
                "{},{}:USERID:UNIX:alice\r\n",
                server_addr.port(),
                client_addr.port()
            )
        );
    }
}
