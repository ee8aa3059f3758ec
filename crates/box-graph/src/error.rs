//! Error types for the box graph
//!
//! Structural errors (broken invariants, corrupt input) fail loudly. The two
//! unresolved variants are the transient conditions cross-context replay
//! can observe; [`GraphError::is_transient`] tells them apart.

use box_core::{Address, BoxId, PointerType, PrimitiveType, SchemaError, SerializeError};

/// Main box graph error type
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Mutation attempted outside a transaction
    #[error("no transaction is open")]
    NoTransaction,

    /// Transaction opened while another is open
    #[error("a transaction is already in progress")]
    TransactionInProgress,

    /// Box id not present
    #[error("unknown box: {0}")]
    UnknownBox(BoxId),

    /// Box id already present
    #[error("box already exists: {0}")]
    DuplicateBox(BoxId),

    /// Address does not resolve to a vertex
    #[error("unresolved address: {0}")]
    UnresolvedAddress(Address),

    /// Address is not a primitive field
    #[error("not a primitive field: {0}")]
    NotAPrimitive(Address),

    /// Address is not a pointer field
    #[error("not a pointer field: {0}")]
    NotAPointer(Address),

    /// Value type differs from the field type
    #[error("type mismatch at {address}: expected {expected}, got {actual}")]
    TypeMismatch {
        address: Address,
        expected: PrimitiveType,
        actual: PrimitiveType,
    },

    /// Target vertex does not accept the pointer type
    #[error("{target} does not accept {pointer_type} from {pointer}")]
    PointerRejected {
        pointer: Address,
        target: Address,
        pointer_type: PointerType,
    },

    /// Pending pointer still unresolved at commit
    #[error("pointer {pointer} targets {target}, which does not exist")]
    UnresolvedPointer { pointer: Address, target: Address },

    /// Box is the target of mandatory pointers and cascade was not requested
    #[error("box {target} is held by {} mandatory pointer(s)", pointers.len())]
    MandatoryPointers { target: BoxId, pointers: Vec<Address> },

    /// Cascading delete found a cycle of mandatory pointers
    #[error("mandatory pointer cycle while cascading: {path:?}")]
    CascadeCycle { path: Vec<BoxId> },

    /// Low-level removal of a box that is still pointed at
    #[error("box {uuid} still has {count} incoming pointer(s)")]
    HasIncomingPointers { uuid: BoxId, count: usize },

    /// Commit-time requirement failed
    #[error("requirement violated at {address}: {reason}")]
    RequirementViolated { address: Address, reason: String },

    /// Rollback could not revert an update
    #[error("failed to revert {kind} update: {source}")]
    RevertFailed {
        kind: &'static str,
        #[source]
        source: Box<GraphError>,
    },

    /// Reverse index diverged from pointer fields
    #[error("pointer hub of {target} is inconsistent with pointer fields")]
    HubInconsistent { target: Address },

    /// Snapshot could not be loaded
    #[error("project file is corrupt: {0}")]
    CorruptSnapshot(String),

    /// Schema lookup error
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Field decoding error
    #[error("project file is corrupt: {0}")]
    Serialize(#[from] SerializeError),
}

impl GraphError {
    /// Check if the error may clear up once pending sync tasks arrive
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedAddress(_) | Self::UnresolvedPointer { .. } | Self::UnknownBox(_)
        )
    }

    /// Check if the error signals corrupt persisted data
    #[inline]
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptSnapshot(_) | Self::Serialize(_))
    }

    /// Check if the error is an invariant violation (programming or data bug)
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        !self.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let id = BoxId::random();
        assert!(GraphError::UnresolvedAddress(Address::root(id)).is_transient());
        assert!(GraphError::DuplicateBox(id).is_structural());
        assert!(GraphError::CorruptSnapshot("eof".into()).is_corruption());
        assert!(!GraphError::NoTransaction.is_corruption());
    }

    #[test]
    fn corrupt_messages_name_the_project_file() {
        let err = GraphError::CorruptSnapshot("bad header".into());
        assert!(err.to_string().starts_with("project file is corrupt"));
    }
}
