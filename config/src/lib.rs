// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration of the ident daemon: the file model, its loader and the
//! snapshot shared between the accept loop and in-flight sessions.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod errors;
mod loader;
mod model;
mod shared;

pub use errors::ConfigError;
pub use loader::{ConfigOverrides, ConfigSource, DEFAULT_CONFIG_PATH};
pub use model::{IdentdConfig, MasqClient, NatConfig, NatPrecedence, UserPolicy};
pub use shared::SharedConfig;
