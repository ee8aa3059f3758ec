//! Addresses of vertices within a graph
//!
//! Provides [`Address`]: the id of the owning box plus the chain of field
//! keys leading to a nested field. An empty key chain addresses the box
//! itself.

use crate::id::{BoxId, IdError};
use crate::io::{count_u16, DataInput, DataOutput, IoError, MAX_ENTRIES};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Numeric key of a field within its parent, fixed by the schema
pub type FieldKey = u16;

/// Key chain of an address. Most fields nest at most a few levels deep.
pub type FieldKeys = SmallVec<[FieldKey; 4]>;

/// Location of a box or of a field within a box
///
/// Ordering is lexicographic on the box id, then on the key chain, so a box
/// sorts directly before all of its fields and the fields of one box form a
/// contiguous range.
///
/// # Examples
/// - `3f2a…/` → the box itself
/// - `3f2a…/2/0` → element 0 of the array field with key 2
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    uuid: BoxId,
    keys: FieldKeys,
}

impl Address {
    /// Compose an address from a box id and a key chain
    #[inline]
    #[must_use]
    pub fn compose(uuid: BoxId, keys: &[FieldKey]) -> Self {
        Self {
            uuid,
            keys: SmallVec::from_slice(keys),
        }
    }

    /// Address of the box itself
    #[inline]
    #[must_use]
    pub fn root(uuid: BoxId) -> Self {
        Self {
            uuid,
            keys: SmallVec::new(),
        }
    }

    /// Owning box
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> BoxId {
        self.uuid
    }

    /// Field key chain
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &[FieldKey] {
        &self.keys
    }

    /// Check if this addresses a box rather than a field
    #[inline]
    #[must_use]
    pub fn is_box(&self) -> bool {
        self.keys.is_empty()
    }

    /// Nesting depth (0 for a box)
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.keys.len()
    }

    /// Append a key, returning the child address
    #[inline]
    #[must_use]
    pub fn append(&self, key: FieldKey) -> Self {
        let mut keys = self.keys.clone();
        keys.push(key);
        Self {
            uuid: self.uuid,
            keys,
        }
    }

    /// Parent address (`None` for a box)
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.keys.is_empty() {
            return None;
        }
        Some(Self::compose(self.uuid, &self.keys[..self.keys.len() - 1]))
    }

    /// Check if `prefix` is this address or one of its ancestors
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.uuid == prefix.uuid && self.keys.starts_with(&prefix.keys)
    }

    /// All ancestors from the box down to (and including) this address
    pub fn lineage(&self) -> impl Iterator<Item = Address> + '_ {
        (0..=self.keys.len()).map(move |n| Self::compose(self.uuid, &self.keys[..n]))
    }

    /// Binary encoding: 16 id bytes, `u16` key count, `u16` keys
    ///
    /// # Panics
    /// When the address has more than [`MAX_ENTRIES`] keys
    pub fn write(&self, out: &mut DataOutput) {
        out.write_raw(self.uuid.as_bytes());
        out.write_u16(count_u16(self.keys.len()));
        for key in &self.keys {
            out.write_u16(*key);
        }
    }

    /// Decode an address written by [`Self::write`]
    ///
    /// # Errors
    /// Returns error on truncated input
    pub fn read(input: &mut DataInput) -> Result<Self, IoError> {
        let raw = input.read_raw(BoxId::LENGTH)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&raw);
        let count = input.read_u16()?;
        let mut keys = FieldKeys::with_capacity(count as usize);
        for _ in 0..count {
            keys.push(input.read_u16()?);
        }
        Ok(Self {
            uuid: BoxId::from_bytes(bytes),
            keys,
        })
    }
}

impl From<BoxId> for Address {
    fn from(uuid: BoxId) -> Self {
        Self::root(uuid)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)?;
        for key in &self.keys {
            write!(f, "/{key}")?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let uuid: BoxId = parts.next().unwrap_or_default().parse()?;
        let keys = parts
            .map(|seg| {
                seg.parse::<FieldKey>()
                    .map_err(|_| AddressError::InvalidKey(seg.to_string()))
            })
            .collect::<Result<FieldKeys, _>>()?;
        if keys.len() > MAX_ENTRIES {
            return Err(AddressError::TooDeep(keys.len()));
        }
        Ok(Self { uuid, keys })
    }
}

/// Errors parsing textual addresses
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    /// Box id part is invalid
    #[error("invalid box id: {0}")]
    Id(#[from] IdError),

    /// Key segment is not a `u16`
    #[error("invalid field key: {0}")]
    InvalidKey(String),

    /// More keys than the binary form can count
    #[error("address has {0} keys, at most 65535 are allowed")]
    TooDeep(usize),
}
