use serde::{Deserialize, Serialize};
use std::fmt::Display;

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// Short identifier naming a stored URL.
///
/// Generated identifiers are the lowercase hex rendering of the FNV-1 32-bit
/// hash of the original URL, so they are always 8 characters long. Distinct
/// URLs may collide; a collision is reported by the repository as a conflict.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortId(String);

impl ShortId {
    /// Derives the identifier for `url`. The owner never affects the result.
    pub fn from_url(url: &str) -> Self {
        Self(format!("{:08x}", fnv1_32(url.as_bytes())))
    }

    /// Wraps an identifier received from a client.
    ///
    /// No validation is performed: a malformed identifier can never match a
    /// stored record, so lookups report it as not found.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for ShortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShortId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ShortId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ShortId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// FNV-1 (multiply, then xor) over `bytes`.
fn fnv1_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV32_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV32_PRIME) ^ u32::from(*byte)
    })
}
