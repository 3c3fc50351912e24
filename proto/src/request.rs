// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ident request lines: `<port-on-this-host> , <port-on-querying-host>`

use crate::port::{IdentPort, InvalidPort};

/// Longest request line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 512;

/// A request as parsed off the wire. The integers are kept as sent so that
/// replies, including error replies, echo them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub local: i64,
    pub remote: i64,
}

/// A request whose ports have been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub local: IdentPort,
    pub remote: IdentPort,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request: {0:?}")]
    Malformed(String),
}

impl Request {
    /// Validate both ports. Both must lie in 1-65535.
    pub fn ports(&self) -> Result<PortPair, InvalidPort> {
        Ok(PortPair {
            local: IdentPort::new_checked(self.local)?,
            remote: IdentPort::new_checked(self.remote)?,
        })
    }
}

/// Parse a leading (optionally signed) decimal integer, skipping leading whitespace.
/// Returns the value and the unparsed remainder.
fn leading_int(input: &str) -> Option<(i64, &str)> {
    let input = input.trim_start();
    let unsigned = input.strip_prefix(['+', '-']).unwrap_or(input);
    let digits = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    if digits == 0 {
        return None;
    }
    let end = input.len() - unsigned.len() + digits;
    let value = input[..end].parse::<i64>().ok()?;
    Some((value, &input[end..]))
}

/// Parse an ident request line. Whitespace around the comma is tolerated and anything after the
/// second integer (line terminator included) is ignored.
pub fn parse_request(line: &str) -> Result<Request, RequestError> {
    let malformed = || RequestError::Malformed(line.trim_end().to_string());
    let (local, rest) = leading_int(line).ok_or_else(malformed)?;
    let rest = rest.trim_start().strip_prefix(',').ok_or_else(malformed)?;
    let (remote, _) = leading_int(rest).ok_or_else(malformed)?;
    Ok(Request { local, remote })
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_well_formed() {
        let expected = Request {
            local: 4321,
            remote: 23,
        };
        assert_eq!(parse_request("4321, 23\r\n"), Ok(expected));
        assert_eq!(parse_request("4321,23\r\n"), Ok(expected));
        assert_eq!(parse_request("  4321 ,\t23  \n"), Ok(expected));
        assert_eq!(parse_request("4321 , 23 trailing junk\r\n"), Ok(expected));
    }

    #[test]
    fn test_parse_keeps_out_of_range_values() {
        let request = parse_request("99999, 23\r\n").unwrap();
        assert_eq!(
            request,
            Request {
                local: 99999,
                remote: 23
            }
        );
        assert_eq!(request.ports(), Err(InvalidPort(99999)));

        let request = parse_request("0 , -5\r\n").unwrap();
        assert_eq!(request.ports(), Err(InvalidPort(0)));
    }

    #[test]
    fn test_parse_malformed() {
        for line in [
            "",
            "\r\n",
            "4321\r\n",
            "4321 23\r\n",
            "4321,\r\n",
            ",23\r\n",
            "abc, 23\r\n",
            "4321, xyz\r\n",
            "- , 23\r\n",
            "99999999999999999999999, 23\r\n",
        ] {
            assert!(
                matches!(parse_request(line), Err(RequestError::Malformed(_))),
                "{line:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_valid_ports() {
        let pair = parse_request("4321, 23\r\n").unwrap().ports().unwrap();
        assert_eq!(pair.local.get(), 4321);
        assert_eq!(pair.remote.get(), 23);
    }
}
