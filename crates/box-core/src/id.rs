//! Box identifiers
//!
//! Provides [`BoxId`], the 16-byte identity of every box in a graph.
//! Ordering is byte-lexicographic so ids can key ordered collections and
//! answer range queries deterministically.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use uuid::{Builder, Uuid};

/// A 16-byte box identifier (UUID)
///
/// Immutable and cheap to copy. Two sentinels bound every range query:
/// [`BoxId::LOWEST`] (all zero bytes) and [`BoxId::HIGHEST`] (all `0xff`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxId(Uuid);

impl BoxId {
    /// Floor sentinel, sorts before every generated id
    pub const LOWEST: Self = Self(Uuid::from_bytes([0x00; 16]));

    /// Ceiling sentinel, sorts after every generated id
    pub const HIGHEST: Self = Self(Uuid::from_bytes([0xff; 16]));

    /// Byte length of an encoded id
    pub const LENGTH: usize = 16;

    /// Create from raw bytes
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Generate a random (v4) id
    #[inline]
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Generate a v4 id from the given random source
    ///
    /// Used where id generation must be reproducible (seeded simulations).
    #[must_use]
    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let bytes: [u8; 16] = rng.gen();
        Self(Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Content-derived id
    ///
    /// Takes the first 16 bytes of the SHA-256 digest and applies the v4
    /// version and variant bits, so identical content always collapses to
    /// the same identity.
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Create id from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        if bytes.len() != Self::LENGTH {
            return Err(IdError::InvalidLength {
                expected: Self::LENGTH,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(bytes);
        Ok(Self::from_bytes(arr))
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Underlying UUID
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short hex form (first 4 bytes), for log lines
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.as_bytes()[..4])
    }
}

impl Display for BoxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for BoxId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for BoxId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl AsRef<[u8; 16]> for BoxId {
    fn as_ref(&self) -> &[u8; 16] {
        self.as_bytes()
    }
}

/// Errors that can occur when building identifiers
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Invalid byte length
    #[error("invalid id length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Textual form could not be parsed
    #[error("invalid id: {0}")]
    Parse(#[from] uuid::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sentinels_bound_every_id() {
        for _ in 0..64 {
            let id = BoxId::random();
            assert!(BoxId::LOWEST < id);
            assert!(id < BoxId::HIGHEST);
        }
    }

    #[test]
    fn ordering_is_byte_lexicographic() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        a[0] = 1;
        b[15] = 0xff;
        assert!(BoxId::from_bytes(b) < BoxId::from_bytes(a));
    }

    #[test]
    fn sha256_is_deterministic() {
        let a = BoxId::sha256(b"kick.wav");
        let b = BoxId::sha256(b"kick.wav");
        let c = BoxId::sha256(b"snare.wav");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let mut r1 = StdRng::seed_from_u64(7);
        let mut r2 = StdRng::seed_from_u64(7);
        assert_eq!(BoxId::from_rng(&mut r1), BoxId::from_rng(&mut r2));
    }

    #[test]
    fn display_and_parse() {
        let id = BoxId::random();
        let parsed: BoxId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_slice_invalid_length() {
        let result = BoxId::from_slice(&[1u8; 15]);
        assert!(matches!(
            result,
            Err(IdError::InvalidLength {
                expected: 16,
                actual: 15
            })
        ));
    }
}
