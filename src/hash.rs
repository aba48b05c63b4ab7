//! Content fingerprints for the render cache and the build manifest.
//!
//! Every fingerprint in the build is an XXH3-128 digest. It is not a
//! cryptographic hash: the only requirement is that two different source
//! files practically never collide, and that the same bytes always hash to
//! the same value on every machine and across process restarts. XXH3 has no
//! seed, no dependence on pointer addresses and no platform-specific output,
//! so digests written to disk by one build are comparable by the next.
//!
//! Digests are displayed and persisted as 32 lowercase hex characters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use xxhash_rust::xxh3::xxh3_128;

/// A 128-bit content fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Hex length of a displayed digest.
    pub const HEX_LEN: usize = 32;

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

/// Hash a byte slice.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    ContentHash(xxh3_128(data).to_be_bytes())
}

/// Hash the full contents of a file.
///
/// Fails if the file cannot be read. Callers that only need the hash for a
/// cache lookup should treat the error as a miss rather than a build failure.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// Fold two fingerprints into one by hashing the concatenation of their
/// hex digests. Order matters: `combine(a, b) != combine(b, a)` in general.
pub fn combine(a: ContentHash, b: ContentHash) -> ContentHash {
    let mut buf = String::with_capacity(ContentHash::HEX_LEN * 2);
    buf.push_str(&a.to_hex());
    buf.push_str(&b.to_hex());
    hash_bytes(buf.as_bytes())
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Error returned when parsing a hex digest fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash: {0:?}")]
pub struct ParseHashError(String);

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN || !s.is_ascii() {
            return Err(ParseHashError(s.to_string()));
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseHashError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
