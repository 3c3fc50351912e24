// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NAT mappings, as read from the kernel connection tracking table

use crate::direct::proxy_relaxed;
use crate::errors::TableError;
use parking_lot::Mutex;
use proto::ConnectionTuple;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::path::Path;

#[allow(unused)]
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatProtocol {
    Tcp,
    Udp,
    Other(u8),
}

impl From<u8> for NatProtocol {
    fn from(number: u8) -> Self {
        match number {
            6 => NatProtocol::Tcp,
            17 => NatProtocol::Udp,
            other => NatProtocol::Other(other),
        }
    }
}

/// One active address translation.
///
/// The remote peer sees the connection as `outside` <-> `remote`; the host behind the NAT
/// sees it as `inside` <-> `remote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatEntry {
    pub protocol: NatProtocol,
    pub outside: SocketAddrV4,
    pub remote: SocketAddrV4,
    pub inside: SocketAddrV4,
}

impl NatEntry {
    /// Tell if this entry is an actual translation. Connections of the gateway itself are
    /// tracked too, with identical inside and outside endpoints.
    #[must_use]
    pub fn is_translated(&self) -> bool {
        self.inside != self.outside
    }

    /// Tell if this entry describes the connection `tuple` asks about. The tuple must be in
    /// IPv4 form. The same proxy relaxation as Direct Lookup applies to the remote address.
    #[must_use]
    pub fn matches(&self, tuple: &ConnectionTuple, proxy: Option<IpAddr>) -> bool {
        self.protocol == NatProtocol::Tcp
            && self.is_translated()
            && tuple.local_port().get() == self.outside.port()
            && tuple.remote_port().get() == self.remote.port()
            && tuple.local_addr() == IpAddr::V4(*self.outside.ip())
            && (tuple.remote_addr() == IpAddr::V4(*self.remote.ip())
                || proxy_relaxed(tuple, proxy))
    }
}

/// A fallible, lazily-produced sequence of NAT records. A record that fails to be read ends
/// the traversal.
pub type NatRecords<'a> = Box<dyn Iterator<Item = Result<NatEntry, TableError>> + Send + 'a>;

/// A read-only source of NAT mappings.
pub trait NatTable: Send + Sync {
    /// Tell if NAT state can be read on this host. Checked once at startup.
    fn available(&self) -> bool {
        true
    }
    /// Start a traversal over a fresh snapshot of the mappings.
    fn records(&self) -> Result<NatRecords<'_>, TableError>;
}

const CONNTRACK: &str = "conntrack table";

fn malformed(line: &str) -> TableError {
    TableError::Malformed {
        table: CONNTRACK,
        record: line.to_string(),
    }
}

/// Fill the first empty slot: keys appear once per direction, original first.
fn store<T>(slots: &mut [Option<T>; 2], value: T) {
    if let Some(slot) = slots.iter_mut().find(|slot| slot.is_none()) {
        *slot = Some(value);
    }
}

/// Parse one line of `/proc/net/nf_conntrack`, or of the legacy `/proc/net/ip_conntrack`
/// which lacks the two leading layer-3 columns:
///
/// ```text
/// ipv4     2 tcp      6 431999 ESTABLISHED src=192.168.1.10 dst=198.51.100.7 sport=40000 dport=6667 src=198.51.100.7 dst=203.0.113.1 sport=6667 dport=40000 [ASSURED] mark=0 use=2
/// ```
///
/// The first `src/dst/sport/dport` group is the original direction (inside host to remote),
/// the second is the reply direction (remote to the gateway's outside address). Records that
/// are not IPv4 TCP/UDP yield `None`.
pub(crate) fn parse_conntrack_line(line: &str) -> Result<Option<NatEntry>, TableError> {
    let mut tokens = line.split_whitespace().peekable();
    match tokens.peek() {
        None => return Ok(None),
        Some(&"ipv6") => return Ok(None),
        Some(&"ipv4") => {
            tokens.next();
            tokens.next();
        }
        Some(_) => {}
    }
    let _ = tokens.next(); // l4 name
    let protocol = tokens
        .next()
        .and_then(|number| number.parse::<u8>().ok())
        .map(NatProtocol::from)
        .ok_or_else(|| malformed(line))?;
    if !matches!(protocol, NatProtocol::Tcp | NatProtocol::Udp) {
        return Ok(None);
    }

    // [original, reply] for each key
    let mut src: [Option<Ipv4Addr>; 2] = [None; 2];
    let mut dst: [Option<Ipv4Addr>; 2] = [None; 2];
    let mut sport: [Option<u16>; 2] = [None; 2];
    let mut dport: [Option<u16>; 2] = [None; 2];

    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "src" => store(&mut src, value.parse().map_err(|_| malformed(line))?),
            "dst" => store(&mut dst, value.parse().map_err(|_| malformed(line))?),
            "sport" => store(&mut sport, value.parse().map_err(|_| malformed(line))?),
            "dport" => store(&mut dport, value.parse().map_err(|_| malformed(line))?),
            _ => {}
        }
    }

    let (
        [Some(inside_ip), Some(_)],
        [Some(remote_ip), Some(outside_ip)],
        [Some(inside_port), Some(_)],
        [Some(remote_port), Some(outside_port)],
    ) = (src, dst, sport, dport)
    else {
        return Err(malformed(line));
    };

    Ok(Some(NatEntry {
        protocol,
        outside: SocketAddrV4::new(outside_ip, outside_port),
        remote: SocketAddrV4::new(remote_ip, remote_port),
        inside: SocketAddrV4::new(inside_ip, inside_port),
    }))
}

/// Records of one conntrack snapshot, parsed as they are consumed.
struct ConntrackRecords {
    snapshot: String,
    offset: usize,
}

impl Iterator for ConntrackRecords {
    type Item = Result<NatEntry, TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset < self.snapshot.len() {
            let rest = &self.snapshot[self.offset..];
            let (line, advance) = match rest.find('\n') {
                Some(end) => (&rest[..end], end + 1),
                None => (rest, rest.len()),
            };
            let parsed = parse_conntrack_line(line);
            self.offset += advance;
            if let Some(record) = parsed.transpose() {
                return Some(record);
            }
        }
        None
    }
}

/// The kernel connection tracking table. The source is opened once, while still privileged,
/// and rewound for every snapshot.
pub struct ConntrackTable<R = File> {
    source: Mutex<R>,
}

impl ConntrackTable<File> {
    pub fn open(path: &Path) -> Result<Self, TableError> {
        let file = File::open(path).map_err(|source| TableError::Io {
            table: CONNTRACK,
            source,
        })?;
        debug!("Opened conntrack table at '{}'", path.display());
        Ok(Self::from_reader(file))
    }
}

impl<R: Read + Seek + Send> ConntrackTable<R> {
    pub fn from_reader(source: R) -> Self {
        Self {
            source: Mutex::new(source),
        }
    }

    fn snapshot(&self) -> std::io::Result<String> {
        let mut snapshot = String::new();
        let mut source = self.source.lock();
        source.seek(SeekFrom::Start(0))?;
        source.read_to_string(&mut snapshot)?;
        Ok(snapshot)
    }
}

impl<R: Read + Seek + Send> NatTable for ConntrackTable<R> {
    fn records(&self) -> Result<NatRecords<'_>, TableError> {
        let snapshot = self.snapshot().map_err(|source| TableError::Io {
            table: CONNTRACK,
            source,
        })?;
        Ok(Box::new(ConntrackRecords {
            snapshot,
            offset: 0,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{nat_entry, tuple};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::str::FromStr;

    const NF_CONNTRACK: &str = "\
ipv4     2 tcp      6 431999 ESTABLISHED src=192.168.1.10 dst=198.51.100.7 sport=40000 dport=6667 src=198.51.100.7 dst=203.0.113.1 sport=6667 dport=61000 [ASSURED] mark=0 zone=0 use=2
ipv4     2 udp      17 29 src=192.168.1.11 dst=198.51.100.53 sport=5353 dport=53 src=198.51.100.53 dst=203.0.113.1 sport=53 dport=5353 mark=0 zone=0 use=2
ipv4     2 icmp     1 29 src=192.168.1.12 dst=198.51.100.1 type=8 code=0 id=7 src=198.51.100.1 dst=203.0.113.1 type=0 code=0 id=7 mark=0 use=2
ipv6     10 tcp      6 431999 ESTABLISHED src=2001:db8::1 dst=2001:db8::2 sport=1 dport=2 src=2001:db8::2 dst=2001:db8::1 sport=2 dport=1 mark=0 use=2
";

    #[test]
    fn test_parse_nf_conntrack() {
        let table = ConntrackTable::from_reader(Cursor::new(NF_CONNTRACK.as_bytes().to_vec()));
        let records: Vec<NatEntry> = table.records().unwrap().map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            NatEntry {
                protocol: NatProtocol::Tcp,
                outside: SocketAddrV4::from_str("203.0.113.1:61000").unwrap(),
                remote: SocketAddrV4::from_str("198.51.100.7:6667").unwrap(),
                inside: SocketAddrV4::from_str("192.168.1.10:40000").unwrap(),
            }
        );
        assert_eq!(records[1].protocol, NatProtocol::Udp);

        // the source is rewound for every snapshot
        assert_eq!(table.records().unwrap().count(), 2);
    }

    #[test]
    fn test_parse_legacy_ip_conntrack() {
        let line = "tcp      6 117 ESTABLISHED src=10.1.1.5 dst=192.0.2.9 sport=1025 dport=25 src=192.0.2.9 dst=192.0.2.1 sport=25 dport=1025 [ASSURED] use=1";
        let entry = parse_conntrack_line(line).unwrap().unwrap();
        assert_eq!(entry.inside, SocketAddrV4::from_str("10.1.1.5:1025").unwrap());
        assert_eq!(entry.outside, SocketAddrV4::from_str("192.0.2.1:1025").unwrap());
        assert_eq!(entry.remote, SocketAddrV4::from_str("192.0.2.9:25").unwrap());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_conntrack_line("").unwrap().is_none());
        assert!(matches!(
            parse_conntrack_line("ipv4 2 tcp six 10 src=1.2.3.4"),
            Err(TableError::Malformed { .. })
        ));
        assert!(matches!(
            parse_conntrack_line("ipv4 2 tcp 6 10 ESTABLISHED src=1.2.3.4 dst=5.6.7.8 sport=1 dport=2"),
            Err(TableError::Malformed { .. })
        ));
        assert!(matches!(
            parse_conntrack_line("ipv4 2 tcp 6 10 src=1.2.3.999 dst=5.6.7.8 sport=1 dport=2 src=5.6.7.8 dst=1.2.3.4 sport=2 dport=1"),
            Err(TableError::Malformed { .. })
        ));
    }

    #[test]
    fn test_entry_matching() {
        let entry = nat_entry("192.168.1.10:40000", "203.0.113.1:61000", "198.51.100.7:6667");
        assert!(entry.matches(&tuple("203.0.113.1", 61000, "198.51.100.7", 6667), None));
        assert!(!entry.matches(&tuple("203.0.113.1", 61001, "198.51.100.7", 6667), None));
        assert!(!entry.matches(&tuple("203.0.113.1", 61000, "198.51.100.7", 6668), None));
        assert!(!entry.matches(&tuple("203.0.113.2", 61000, "198.51.100.7", 6667), None));

        let via_proxy = tuple("203.0.113.1", 61000, "203.0.113.254", 6667);
        assert!(!entry.matches(&via_proxy, None));
        let proxy = IpAddr::from_str("203.0.113.254").unwrap();
        assert!(entry.matches(&via_proxy, Some(proxy)));

        // not a translation: the gateway's own connection
        let own = nat_entry("203.0.113.1:61000", "203.0.113.1:61000", "198.51.100.7:6667");
        assert!(!own.matches(&tuple("203.0.113.1", 61000, "198.51.100.7", 6667), None));

        // only TCP
        let mut udp = entry.clone();
        udp.protocol = NatProtocol::Udp;
        assert!(!udp.matches(&tuple("203.0.113.1", 61000, "198.51.100.7", 6667), None));
    }
}
