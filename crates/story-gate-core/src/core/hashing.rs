// crates/story-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Story Gate Content Digests
// Description: Canonical JSON encoding and SHA-256 digests for gate records.
// Purpose: Give runs, ledger rows, and pattern catalogs a stable fingerprint.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! A record's digest is taken over its JCS canonical JSON (RFC 8785): object
//! keys sorted, no insignificant whitespace. Two processes serializing the
//! same validation run therefore agree on its evidence hash, and stores can
//! detect a tampered row by recomputing the digest of the stored bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Algorithms
// ============================================================================

/// Digest function recorded next to every stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
}

/// Algorithm used for every digest the gate writes.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

impl HashAlgorithm {
    /// Column label written by the stores.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Resolves a stored column label; unknown labels yield `None`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        (label == Self::Sha256.label()).then_some(Self::Sha256)
    }

    /// Digests `bytes` with this algorithm.
    #[must_use]
    pub fn digest(self, bytes: &[u8]) -> HashDigest {
        let raw = match self {
            Self::Sha256 => Sha256::digest(bytes),
        };
        HashDigest::new(self, &raw)
    }
}

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Hex digest tagged with the algorithm that produced it.
///
/// Renders as `<label>:<hex>`, e.g. `sha256:ba78...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Producing algorithm.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex of the raw digest.
    pub value: String,
}

impl HashDigest {
    /// Wraps raw digest bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, raw: &[u8]) -> Self {
        let mut value = String::with_capacity(raw.len() * 2);
        for byte in raw {
            // Writing into a String cannot fail.
            let _ = write!(value, "{byte:02x}");
        }
        Self { algorithm, value }
    }

    /// True when `bytes` digest to this value under the same algorithm.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.algorithm.digest(bytes).value == self.value
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.algorithm.label())?;
        f.write_str(":")?;
        f.write_str(&self.value)
    }
}

/// Canonical encoding failure.
#[derive(Debug, Error)]
pub enum HashError {
    /// The value could not be written as canonical JSON.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Functions
// ============================================================================

/// Encodes `value` as JCS canonical JSON.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when `value` does not serialize
/// (non-finite floats, non-string map keys).
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Digests the canonical JSON of `value`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when `value` does not serialize.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    canonical_json_bytes(value).map(|bytes| algorithm.digest(&bytes))
}

/// Digests raw bytes.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    algorithm.digest(bytes)
}
