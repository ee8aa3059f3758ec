//! Graph update records
//!
//! Every committed change is one of four updates. Each carries enough data
//! to be replayed forward and to build its exact inverse, which is all undo,
//! rollback and sync need.

use box_core::{Address, BoxId, PrimitiveValue};
use bytes::Bytes;

/// One recorded change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphUpdate {
    /// Box staged, with its encoded fields
    New {
        uuid: BoxId,
        name: String,
        snapshot: Bytes,
    },
    /// Primitive field changed
    Primitive {
        address: Address,
        old: PrimitiveValue,
        new: PrimitiveValue,
    },
    /// Pointer field changed
    Pointer {
        address: Address,
        old: Option<Address>,
        new: Option<Address>,
    },
    /// Box unstaged, with its encoded fields at removal
    Delete {
        uuid: BoxId,
        name: String,
        snapshot: Bytes,
    },
}

impl GraphUpdate {
    /// Update that undoes this one
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::New {
                uuid,
                name,
                snapshot,
            } => Self::Delete {
                uuid: *uuid,
                name: name.clone(),
                snapshot: snapshot.clone(),
            },
            Self::Delete {
                uuid,
                name,
                snapshot,
            } => Self::New {
                uuid: *uuid,
                name: name.clone(),
                snapshot: snapshot.clone(),
            },
            Self::Primitive { address, old, new } => Self::Primitive {
                address: address.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            Self::Pointer { address, old, new } => Self::Pointer {
                address: address.clone(),
                old: new.clone(),
                new: old.clone(),
            },
        }
    }

    /// Vertex the update belongs to (the box root for `New`/`Delete`)
    #[must_use]
    pub fn address(&self) -> Address {
        match self {
            Self::New { uuid, .. } | Self::Delete { uuid, .. } => Address::root(*uuid),
            Self::Primitive { address, .. } | Self::Pointer { address, .. } => address.clone(),
        }
    }

    /// Box the update belongs to
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> BoxId {
        match self {
            Self::New { uuid, .. } | Self::Delete { uuid, .. } => *uuid,
            Self::Primitive { address, .. } | Self::Pointer { address, .. } => address.uuid(),
        }
    }

    /// Short kind label for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::New { .. } => "new",
            Self::Primitive { .. } => "primitive",
            Self::Pointer { .. } => "pointer",
            Self::Delete { .. } => "delete",
        }
    }
}
