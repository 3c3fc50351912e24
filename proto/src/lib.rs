// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! RFC 1413 wire protocol: ports, connection tuples, request lines and reply lines.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod port;
mod reply;
mod request;
mod tuple;

pub use port::{IdentPort, InvalidPort};
pub use reply::{ErrorReason, ParsedReply, Reply, ReplyParseError, parse_reply};
pub use request::{MAX_LINE_LEN, PortPair, Request, RequestError, parse_request};
pub use tuple::ConnectionTuple;
