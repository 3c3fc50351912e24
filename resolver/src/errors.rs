// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Failed to read {table}: {source}")]
    Io {
        table: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read {table}: {reason}")]
    Read { table: &'static str, reason: String },
    #[error("Malformed {table} record: {record:?}")]
    Malformed { table: &'static str, record: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("The kernel socket table is not available on this host")]
    SocketTableUnavailable,
}
