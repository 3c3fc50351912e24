// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ident reply lines, both the ones we write and the ones we read back
//! from upstream ident servers.

use crate::request::{Request, parse_request};
use std::fmt::Display;

/// The reason codes a peer may ever see in an `ERROR` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::IntoStaticStr)]
pub enum ErrorReason {
    #[strum(serialize = "INVALID-PORT")]
    InvalidPort,
    #[strum(serialize = "NO-USER")]
    NoUser,
    #[strum(serialize = "HIDDEN-USER")]
    HiddenUser,
    #[strum(serialize = "UNKNOWN-ERROR")]
    UnknownError,
}

/// A reply to write back to the querying peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    UserId {
        request: Request,
        os: String,
        user: String,
    },
    Error {
        request: Request,
        reason: ErrorReason,
    },
}

impl Reply {
    #[must_use]
    pub fn user_id(request: Request, os: impl Into<String>, user: impl Into<String>) -> Self {
        Reply::UserId {
            request,
            os: os.into(),
            user: user.into(),
        }
    }
    #[must_use]
    pub fn error(request: Request, reason: ErrorReason) -> Self {
        Reply::Error { request, reason }
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::UserId { request, os, user } => write!(
                f,
                "{},{}:USERID:{os}:{user}\r\n",
                request.local, request.remote
            ),
            Reply::Error { request, reason } => {
                write!(f, "{},{}:ERROR:{reason}\r\n", request.local, request.remote)
            }
        }
    }
}

/// A reply as read from an upstream ident server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    UserId {
        request: Request,
        os: String,
        charset: Option<String>,
        user: String,
    },
    Error {
        request: Request,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyParseError {
    #[error("reply has no port pair")]
    MissingPorts,
    #[error("reply is missing field '{0}'")]
    MissingField(&'static str),
    #[error("unknown reply type '{0}'")]
    UnknownType(String),
    #[error("field '{0}' contains a reserved character")]
    ReservedCharacter(&'static str),
}

/// Fields we may relay must not break out of the reply line. The user identifier is the
/// last field, so colons are fine there.
fn check_field(
    field: &'static str,
    value: &str,
    reserved: &[char],
) -> Result<(), ReplyParseError> {
    if value.contains(|c: char| c.is_control() || reserved.contains(&c)) {
        return Err(ReplyParseError::ReservedCharacter(field));
    }
    Ok(())
}

/// Parse `<a> , <b> : USERID : <os>[,<charset>] : <user>` or `<a> , <b> : ERROR : <reason>`.
/// The user identifier is everything after the third colon, minus surrounding whitespace.
pub fn parse_reply(line: &str) -> Result<ParsedReply, ReplyParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (ports, rest) = line
        .split_once(':')
        .ok_or(ReplyParseError::MissingField("type"))?;
    let request = parse_request(ports).map_err(|_| ReplyParseError::MissingPorts)?;
    let (kind, rest) = rest.split_once(':').unwrap_or((rest, ""));

    match kind.trim() {
        "USERID" => {
            let (os, user) = rest
                .split_once(':')
                .ok_or(ReplyParseError::MissingField("user-id"))?;
            let (os, charset) = match os.split_once(',') {
                Some((os, charset)) => (os.trim(), Some(charset.trim().to_string())),
                None => (os.trim(), None),
            };
            let user = user.trim();
            if os.is_empty() {
                return Err(ReplyParseError::MissingField("opsys"));
            }
            if user.is_empty() {
                return Err(ReplyParseError::MissingField("user-id"));
            }
            check_field("opsys", os, &[':', ','])?;
            check_field("user-id", user, &[])?;
            Ok(ParsedReply::UserId {
                request,
                os: os.to_string(),
                charset,
                user: user.to_string(),
            })
        }
        "ERROR" => {
            let reason = rest.trim();
            if reason.is_empty() {
                return Err(ReplyParseError::MissingField("error-type"));
            }
            Ok(ParsedReply::Error {
                request,
                reason: reason.to_string(),
            })
        }
        other => Err(ReplyParseError::UnknownType(other.to_string())),
    }
}
