//! Error types for synchronization

use box_core::{IdError, IoError, ValueError};
use box_graph::{Checksum, GraphError};

/// Errors decoding tasks and messages
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown {kind} tag {tag}")]
    UnknownTag { kind: &'static str, tag: u8 },

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error("{0} trailing bytes after message")]
    Trailing(usize),
}

/// Errors moving envelopes between contexts
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The other end of the port is gone
    #[error("port disconnected")]
    Disconnected,
}

/// Main synchronization error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A batch could not be applied; the replica was rolled back
    #[error("batch rejected: {0}")]
    Rejected(#[source] GraphError),

    /// Replica state differs from the source
    #[error("checksum mismatch: local {local}, remote {remote}")]
    ChecksumMismatch { local: Checksum, remote: Checksum },

    /// Message not valid in this role
    #[error("unexpected {0} message")]
    Unexpected(&'static str),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Check if the replica must be rebuilt from a full snapshot
    #[inline]
    #[must_use]
    pub fn requires_resync(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::ChecksumMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resync_classification() {
        assert!(SyncError::Rejected(GraphError::NoTransaction).requires_resync());
        assert!(!SyncError::Transport(TransportError::Disconnected).requires_resync());
        assert!(!SyncError::Unexpected("updates").requires_resync());
    }
}
