// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of the ident daemon

#![deny(clippy::all, clippy::pedantic)]

pub use clap::Parser;
use config::{ConfigOverrides, ConfigSource};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "identd")]
#[command(version)]
#[command(about = "An RFC 1413 ident server", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct CmdArgs {
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Configuration file. Defaults to /etc/identd.yaml if it exists"
    )]
    config: Option<PathBuf>,

    #[arg(
        short,
        long = "address",
        value_name = "ADDRESS",
        value_delimiter = ',',
        help = "Address to listen on. May be repeated, or given as a comma-separated list"
    )]
    addresses: Vec<IpAddr>,

    #[arg(short, long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    #[arg(short, long, value_name = "N", help = "Maximum number of concurrent connections")]
    limit: Option<usize>,

    #[arg(
        short,
        long,
        value_name = "SECONDS",
        help = "Close connections that have not been answered after this long"
    )]
    timeout: Option<u64>,

    #[arg(short, long, value_name = "TOKEN", help = "Operating system token to report")]
    os: Option<String>,

    #[arg(long, value_name = "NAME", help = "Identifier to report when a lookup fails")]
    fallback_user: Option<String>,

    #[arg(
        short = 'P',
        long,
        value_name = "ADDRESS",
        help = "Address of a proxy relaying connections for other hosts"
    )]
    proxy: Option<IpAddr>,

    #[arg(short, long, help = "Answer for connections masqueraded through this host")]
    masquerade: bool,

    #[arg(short, long, help = "Forward queries to hosts behind the NAT")]
    forward: bool,

    #[arg(
        long,
        help = "Prefer statically configured NAT clients over forwarded answers"
    )]
    nat_override: bool,

    #[arg(short, long, value_name = "USER", help = "Drop privileges to this user")]
    user: Option<String>,

    #[arg(short, long, value_name = "GROUP", help = "Drop privileges to this group")]
    group: Option<String>,

    #[arg(
        short = 'i',
        long,
        help = "Serve a single request on standard input (inetd mode)"
    )]
    stdio: bool,

    #[arg(short, long, help = "Enable debug logging")]
    debug: bool,

    #[arg(
        long,
        value_name = "FILTER",
        help = "Tracing filter directives, e.g. 'info' or 'identd_resolver=debug,info'"
    )]
    tracing: Option<String>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Append the log to this file instead of standard error. In inetd mode there is no log without it"
    )]
    log_file: Option<PathBuf>,
}

impl CmdArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.addresses.clone(),
            port: self.port,
            connection_limit: self.limit,
            timeout: self.timeout,
            os: self.os.clone(),
            fallback_user: self.fallback_user.clone(),
            proxy: self.proxy,
            masquerade: self.masquerade,
            forward: self.forward,
            nat_override: self.nat_override,
        }
    }

    /// Where to load the configuration from, now and on every reload.
    pub fn config_source(&self) -> ConfigSource {
        ConfigSource::new(self.config.clone(), self.overrides())
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
    pub fn stdio(&self) -> bool {
        self.stdio
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// The tracing filter to install: `--debug` wins over `--tracing`.
    pub fn tracing(&self) -> Option<&str> {
        if self.debug {
            Some("debug")
        } else {
            self.tracing.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{CmdArgs, Parser};
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn test_parse_args() {
        let args = CmdArgs::try_parse_from([
            "identd",
            "-a",
            "127.0.0.1,::1",
            "--address",
            "10.0.0.1",
            "-p",
            "1113",
            "-l",
            "4",
            "--fallback-user",
            "guest",
            "-m",
            "-f",
            "-P",
            "10.0.0.254",
            "-u",
            "nobody",
        ])
        .unwrap();

        let overrides = args.overrides();
        assert_eq!(overrides.listen.len(), 3);
        assert_eq!(overrides.listen[2], std::net::IpAddr::from_str("10.0.0.1").unwrap());
        assert_eq!(overrides.port, Some(1113));
        assert_eq!(overrides.connection_limit, Some(4));
        assert_eq!(overrides.fallback_user.as_deref(), Some("guest"));
        assert!(overrides.masquerade);
        assert!(overrides.forward);
        assert!(!overrides.nat_override);
        assert_eq!(args.user(), Some("nobody"));
        assert_eq!(args.group(), None);
        assert!(!args.stdio());
        assert_eq!(args.tracing(), None);
    }

    #[test]
    fn test_debug_wins() {
        let args = CmdArgs::try_parse_from(["identd", "--tracing", "warn", "-d"]).unwrap();
        assert_eq!(args.tracing(), Some("debug"));
        let args = CmdArgs::try_parse_from(["identd", "--tracing", "warn"]).unwrap();
        assert_eq!(args.tracing(), Some("warn"));
    }

    #[test]
    fn test_config_source() {
        let args = CmdArgs::try_parse_from(["identd", "-c", "/tmp/identd.yaml", "-p", "1113"])
            .unwrap();
        let source = args.config_source();
        assert_eq!(source.path(), Some(std::path::Path::new("/tmp/identd.yaml")));

        let args = CmdArgs::try_parse_from(["identd"]).unwrap();
        assert_eq!(args.config_source().path(), None);
        assert_eq!(args.log_file(), None);

        let args = CmdArgs::try_parse_from(["identd", "-i", "--log-file", "/var/log/identd.log"])
            .unwrap();
        assert!(args.stdio());
        assert_eq!(args.log_file(), Some(std::path::Path::new("/var/log/identd.log")));
    }

    #[test]
    fn test_bad_args() {
        assert!(CmdArgs::try_parse_from(["identd", "-p", "0"]).is_err());
        assert!(CmdArgs::try_parse_from(["identd", "-a", "not-an-address"]).is_err());
    }
}
