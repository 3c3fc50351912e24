// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration snapshot shared between the accept loop and sessions

use crate::model::IdentdConfig;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// A configuration that can be replaced as a whole. Readers get an immutable snapshot
/// which stays valid even if a new configuration is stored while they use it.
#[derive(Clone, Debug)]
pub struct SharedConfig(Arc<ArcSwap<IdentdConfig>>);

impl SharedConfig {
    #[must_use]
    pub fn new(config: IdentdConfig) -> Self {
        SharedConfig(Arc::new(ArcSwap::from_pointee(config)))
    }
    /// Get the current configuration snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<IdentdConfig> {
        self.0.load_full()
    }
    /// Replace the configuration. Snapshots taken before keep the old one.
    pub fn replace(&self, config: IdentdConfig) {
        self.0.store(Arc::new(config));
    }
}
