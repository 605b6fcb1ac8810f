//! Catalog error types

use thiserror::Error;

/// Errors returned by the catalog service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// The partition is not (or no longer) served by any node
    #[error("partition not found: {pt_id}")]
    PartitionNotFound { pt_id: u32 },

    /// The database partition is closed
    #[error("database partition closed: {database}/{pt_id}")]
    DbPtClosed { database: String, pt_id: u32 },

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("broken pipe")]
    BrokenPipe,

    /// Peer closed the stream while a message was being read
    #[error("read message type: EOF")]
    UnexpectedEof,

    #[error("write: connection timed out")]
    WriteTimeout,

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("data node not found: {0}")]
    NodeNotFound(u64),

    #[error("{0}")]
    Other(String),
}

impl MetaError {
    /// Errors caused by partition movement or the network, worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetaError::PartitionNotFound { .. }
                | MetaError::DbPtClosed { .. }
                | MetaError::ConnectionReset
                | MetaError::ConnectionRefused
                | MetaError::BrokenPipe
                | MetaError::UnexpectedEof
                | MetaError::WriteTimeout
        )
    }

    pub fn is_partition_not_found(&self) -> bool {
        matches!(self, MetaError::PartitionNotFound { .. })
    }
}

/// Result type for catalog operations
pub type MetaResult<T> = Result<T, MetaError>;
