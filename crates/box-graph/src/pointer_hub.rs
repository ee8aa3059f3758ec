//! Reverse pointer index
//!
//! A [`PointerHub`] lists the pointer fields currently resolved to one
//! vertex. Hubs are maintained by the graph on every pointer write and are
//! never edited by callers.

use box_core::Address;
use indexmap::IndexSet;

/// Incoming pointers of one vertex
///
/// Add and remove are O(1); iteration order is unspecified once a pointer
/// has been removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerHub {
    incoming: IndexSet<Address>,
}

impl PointerHub {
    /// Addresses of pointer fields targeting this vertex
    pub fn incoming(&self) -> impl ExactSizeIterator<Item = &Address> {
        self.incoming.iter()
    }

    /// Check if a pointer field is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, pointer: &Address) -> bool {
        self.incoming.contains(pointer)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }

    pub(crate) fn add(&mut self, pointer: Address) -> bool {
        self.incoming.insert(pointer)
    }

    pub(crate) fn remove(&mut self, pointer: &Address) -> bool {
        self.incoming.swap_remove(pointer)
    }
}

/// Change to a pointer hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// `pointer` now targets `target`
    Added { target: Address, pointer: Address },
    /// `pointer` no longer targets `target`
    Removed { target: Address, pointer: Address },
}

impl HubEvent {
    /// Vertex whose hub changed
    #[must_use]
    pub fn target(&self) -> &Address {
        match self {
            Self::Added { target, .. } | Self::Removed { target, .. } => target,
        }
    }

    /// Pointer field that was added or removed
    #[must_use]
    pub fn pointer(&self) -> &Address {
        match self {
            Self::Added { pointer, .. } | Self::Removed { pointer, .. } => pointer,
        }
    }
}
