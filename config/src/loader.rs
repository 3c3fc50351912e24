// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loading (and re-loading) the configuration

use crate::errors::ConfigError;
use crate::model::IdentdConfig;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/identd.yaml";

/// Settings given on the command line. They take precedence over the configuration file
/// and are re-applied every time the file is re-read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub listen: Vec<IpAddr>,
    pub port: Option<u16>,
    pub connection_limit: Option<usize>,
    pub timeout: Option<u64>,
    pub os: Option<String>,
    pub fallback_user: Option<String>,
    pub proxy: Option<IpAddr>,
    pub masquerade: bool,
    pub forward: bool,
    pub nat_override: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut IdentdConfig) {
        if !self.listen.is_empty() {
            config.listen.clone_from(&self.listen);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(limit) = self.connection_limit {
            config.connection_limit = limit;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(os) = &self.os {
            config.os.clone_from(os);
        }
        if self.fallback_user.is_some() {
            config.fallback_user.clone_from(&self.fallback_user);
        }
        if self.proxy.is_some() {
            config.proxy = self.proxy;
        }
        if self.masquerade {
            config.nat.enabled = true;
        }
        if self.forward {
            config.nat.forward = true;
        }
        if self.nat_override {
            config.nat.precedence = crate::NatPrecedence::Override;
        }
    }
}

/// Where the configuration comes from: a file (or the built-in defaults) plus command-line overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    path: Option<PathBuf>,
    overrides: ConfigOverrides,
}

impl ConfigSource {
    /// With `path` set to `None` the default path is used if it exists, and the built-in
    /// defaults otherwise. An explicit path must exist.
    #[must_use]
    pub fn new(path: Option<PathBuf>, overrides: ConfigOverrides) -> Self {
        Self { path, overrides }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read_file(path: &Path) -> Result<IdentdConfig, ConfigError> {
        debug!("Reading configuration from '{}'...", path.display());
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        IdentdConfig::from_yaml(&yaml).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build a validated configuration.
    pub fn load(&self) -> Result<IdentdConfig, ConfigError> {
        let mut config = match &self.path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::read_file(default)?
                } else {
                    info!("No configuration file at {DEFAULT_CONFIG_PATH}, using defaults");
                    IdentdConfig::default()
                }
            }
        };
        self.overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::NatPrecedence;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::str::FromStr;
    use tracing_test::traced_test;

    fn write_config(name: &str, yaml: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("identd-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        path
    }

    #[test]
    #[traced_test]
    fn test_load_with_overrides() {
        let path = write_config("overrides.yaml", "os: LINUX\nconnection-limit: 3\n");
        let overrides = ConfigOverrides {
            listen: vec![IpAddr::from_str("127.0.0.1").unwrap()],
            port: Some(1113),
            timeout: Some(5),
            fallback_user: Some("guest".to_string()),
            masquerade: true,
            nat_override: true,
            ..Default::default()
        };
        let config = ConfigSource::new(Some(path), overrides).load().unwrap();
        assert_eq!(config.os, "LINUX");
        assert_eq!(config.connection_limit, 3);
        assert_eq!(config.port, 1113);
        assert_eq!(config.timeout, 5);
        assert_eq!(config.listen, vec![IpAddr::from_str("127.0.0.1").unwrap()]);
        assert_eq!(config.fallback_user.as_deref(), Some("guest"));
        assert!(config.nat.enabled);
        assert!(!config.nat.forward);
        assert_eq!(config.nat.precedence, NatPrecedence::Override);
    }

    #[test]
    fn test_load_errors() {
        let missing = ConfigSource::new(
            Some(PathBuf::from("/nonexistent/identd.yaml")),
            ConfigOverrides::default(),
        );
        assert!(matches!(missing.load(), Err(ConfigError::Io { .. })));

        let path = write_config("broken.yaml", "port: [not, a, port]\n");
        let broken = ConfigSource::new(Some(path), ConfigOverrides::default());
        assert!(matches!(broken.load(), Err(ConfigError::Parse { .. })));

        // overrides are validated too
        let path = write_config("valid.yaml", "os: UNIX\n");
        let overrides = ConfigOverrides {
            connection_limit: Some(0),
            ..Default::default()
        };
        let invalid = ConfigSource::new(Some(path), overrides);
        assert!(matches!(invalid.load(), Err(ConfigError::Invalid(_))));
    }
}
