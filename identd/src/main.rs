// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]

mod privs;

use args::{CmdArgs, Parser};
use config::{ConfigError, ConfigSource, IdentdConfig, SharedConfig};
use privs::PrivilegeError;
use resolver::{
    ConntrackTable, ForwardClient, IdentityResolver, ProcSocketTable, ResolverError, SystemUserDb,
};
use server::{IdentServer, ServerError, SessionContext, SessionError, bind_listeners, serve_inherited};
use std::fs::OpenOptions;
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
enum IdentdError {
    #[error("Invalid tracing directive: {0}")]
    Tracing(String),
    #[error("Failed to open log file '{}': {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    #[diagnostic(help("check the configuration file and the command line options"))]
    Config(#[from] ConfigError),
    #[error("Failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Privileges(#[from] PrivilegeError),
    #[error("Failed to install the {0} handler: {1}")]
    Signal(&'static str, #[source] std::io::Error),
    #[error("Standard input is not a usable socket: {0}")]
    #[diagnostic(help("--stdio is meant to be used under inetd or an equivalent super-server"))]
    Stdio(#[source] std::io::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Where the log goes. In inetd mode standard error is usually the peer's socket too, so
/// nothing is logged there.
fn log_writer(args: &CmdArgs) -> Result<(BoxMakeWriter, bool), IdentdError> {
    match args.log_file() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| IdentdError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok((BoxMakeWriter::new(Mutex::new(file)), false))
        }
        None if args.stdio() => Ok((BoxMakeWriter::new(std::io::sink), false)),
        None => Ok((BoxMakeWriter::new(std::io::stderr), true)),
    }
}

fn init_logging(args: &CmdArgs) -> Result<(), IdentdError> {
    let filter = match args.tracing() {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|e| IdentdError::Tracing(e.to_string()))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let (writer, ansi) = log_writer(args)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .with_line_number(true)
        .init();
    Ok(())
}

/// Build the resolver. The conntrack table is opened here, while still privileged, even when
/// NAT support is off: a later reload may turn it on.
fn build_resolver(config: &IdentdConfig) -> Result<IdentityResolver, IdentdError> {
    let resolver = IdentityResolver::new(Arc::new(ProcSocketTable))?;
    match ConntrackTable::open(&config.nat.conntrack) {
        Ok(table) => Ok(resolver.with_masquerade(Arc::new(table), Arc::new(ForwardClient::new()))),
        Err(e) if config.nat.enabled => {
            warn!("{e}: masquerade lookup disabled");
            Ok(resolver)
        }
        Err(e) => {
            debug!("{e}");
            Ok(resolver)
        }
    }
}

fn drop_privileges(args: &CmdArgs) -> Result<(), IdentdError> {
    match privs::resolve(args.user(), args.group())? {
        Some(credentials) => privs::drop_privileges(credentials)?,
        None => debug!("No user or group to switch to"),
    }
    Ok(())
}

async fn shutdown_requested(mut terminate: Signal) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to wait for SIGINT: {e}");
            }
            info!("SIGINT received");
        }
        _ = terminate.recv() => info!("SIGTERM received"),
    }
}

/// Serve the single connection inherited from inetd as standard input.
async fn serve_stdio(
    args: &CmdArgs,
    context: &SessionContext,
    config: &IdentdConfig,
) -> Result<(), IdentdError> {
    let stdin = std::io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .map_err(IdentdError::Stdio)?;
    let stream = std::net::TcpStream::from(stdin);
    stream.peer_addr().map_err(IdentdError::Stdio)?;
    drop_privileges(args)?;
    let outcome = serve_inherited(context, stream, config).await?;
    debug!("Session ended: {outcome}");
    Ok(())
}

async fn serve(
    args: &CmdArgs,
    source: ConfigSource,
    config: IdentdConfig,
) -> Result<(), IdentdError> {
    let resolver = build_resolver(&config)?;
    let context = SessionContext::new(Arc::new(resolver), Arc::new(SystemUserDb));

    if args.stdio() {
        return serve_stdio(args, &context, &config).await;
    }

    let listeners = bind_listeners(&config)?;
    drop_privileges(args)?;

    let server = IdentServer::new(listeners, context, SharedConfig::new(config), source)?;
    let reload = server.reload_handle();
    let mut hangups =
        signal(SignalKind::hangup()).map_err(|e| IdentdError::Signal("SIGHUP", e))?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!("SIGHUP received");
            reload.request();
        }
    });
    let terminate =
        signal(SignalKind::terminate()).map_err(|e| IdentdError::Signal("SIGTERM", e))?;

    server.run(shutdown_requested(terminate)).await?;
    info!("Stopped");
    Ok(())
}

fn start(args: &CmdArgs) -> Result<(), IdentdError> {
    init_logging(args)?;

    let source = args.config_source();
    let config = source.load()?;
    info!("Starting ident server...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("identd")
        .enable_io()
        .enable_time()
        .build()
        .map_err(IdentdError::Runtime)?;
    runtime.block_on(serve(args, source, config))
}

fn main() -> miette::Result<ExitCode> {
    let args = CmdArgs::parse();
    match start(&args) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("{e}");
            // the report would go to standard error: the peer's socket in inetd mode
            if args.stdio() {
                Ok(ExitCode::FAILURE)
            } else {
                Err(e.into())
            }
        }
    }
}
