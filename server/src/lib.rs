// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The ident service: the per-connection protocol handler and the server that
//! accepts connections and runs sessions.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod errors;
mod inetd;
mod listeners;
mod server;
mod session;

pub use errors::{ServerError, SessionError};
pub use inetd::serve_inherited;
pub use listeners::bind_listeners;
pub use server::{IdentServer, ReloadHandle};
pub use session::{Outcome, SessionContext};
