// crates/story-gate-providers/src/signing.rs
// ============================================================================
// Module: Ed25519 Artifact Signing
// Description: Ed25519 signer and verifier for run evidence digests.
// Purpose: Make validation runs tamper-evident beyond the content hash.
// Dependencies: story-gate-core, ed25519-dalek, base64
// ============================================================================

//! ## Overview
//! The signed message is the canonical JSON encoding of the run's evidence
//! [`HashDigest`], so the algorithm label is covered along with the digest
//! value. Key files hold either 32 raw bytes or their base64 encoding.
//! Verification uses strict Ed25519 rules and only accepts known key ids.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use story_gate_core::ArtifactSigner;
use story_gate_core::ArtifactVerifier;
use story_gate_core::HashDigest;
use story_gate_core::RunSignature;
use story_gate_core::SignatureScheme;
use story_gate_core::SignerError;
use story_gate_core::hashing::canonical_json_bytes;
use thiserror::Error;

use crate::files::read_file_limited;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum key file size in bytes.
const MAX_KEY_FILE_BYTES: usize = 4096;
/// Ed25519 key length in bytes.
const KEY_LENGTH: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key loading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Key file could not be read.
    #[error("key io error: {0}")]
    Io(String),
    /// Key material is malformed.
    #[error("invalid ed25519 key: {0}")]
    Invalid(String),
}

impl From<KeyError> for SignerError {
    fn from(err: KeyError) -> Self {
        Self::Key(err.to_string())
    }
}

// ============================================================================
// SECTION: Signer
// ============================================================================

/// Ed25519 signer over evidence digests.
pub struct Ed25519ArtifactSigner {
    /// Private signing key.
    key: SigningKey,
    /// Key identifier recorded with signatures.
    key_id: String,
}

impl Ed25519ArtifactSigner {
    /// Creates a signer from a 32-byte secret key.
    ///
    /// When `key_id` is `None` the base64 public key is used as identifier.
    #[must_use]
    pub fn from_bytes(secret: &[u8; KEY_LENGTH], key_id: Option<String>) -> Self {
        let key = SigningKey::from_bytes(secret);
        let key_id = key_id.unwrap_or_else(|| Base64.encode(key.verifying_key().to_bytes()));
        Self {
            key,
            key_id,
        }
    }

    /// Loads the secret key from a raw or base64 file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the file cannot be read or decoded.
    pub fn from_key_file(path: &Path, key_id: Option<String>) -> Result<Self, KeyError> {
        let secret = load_key_bytes(path)?;
        Ok(Self::from_bytes(&secret, key_id))
    }

    /// Returns the key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the matching public key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Returns a verifier that trusts this signer's public key.
    #[must_use]
    pub fn verifier(&self) -> Ed25519ArtifactVerifier {
        Ed25519ArtifactVerifier::new().with_key(self.key_id.clone(), self.verifying_key())
    }
}

impl fmt::Debug for Ed25519ArtifactSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519ArtifactSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl ArtifactSigner for Ed25519ArtifactSigner {
    fn sign(&self, digest: &HashDigest) -> Result<RunSignature, SignerError> {
        let message =
            canonical_json_bytes(digest).map_err(|err| SignerError::Sign(err.to_string()))?;
        let signature = self.key.sign(&message);
        Ok(RunSignature {
            scheme: SignatureScheme::Ed25519,
            key_id: self.key_id.clone(),
            signature: signature.to_bytes().to_vec(),
        })
    }
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Ed25519 verifier holding trusted public keys by id.
#[derive(Debug, Clone, Default)]
pub struct Ed25519ArtifactVerifier {
    /// Trusted keys keyed by identifier.
    keys: BTreeMap<String, VerifyingKey>,
}

impl Ed25519ArtifactVerifier {
    /// Creates a verifier with no trusted keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trusts `key` under `key_id`.
    #[must_use]
    pub fn with_key(mut self, key_id: impl Into<String>, key: VerifyingKey) -> Self {
        self.keys.insert(key_id.into(), key);
        self
    }

    /// Trusts the public key stored in a raw or base64 file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the file cannot be read or is not a valid key.
    pub fn with_public_key_file(
        self,
        key_id: impl Into<String>,
        path: &Path,
    ) -> Result<Self, KeyError> {
        let bytes = load_key_bytes(path)?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| KeyError::Invalid("not a valid public key".to_string()))?;
        Ok(self.with_key(key_id, key))
    }
}

impl ArtifactVerifier for Ed25519ArtifactVerifier {
    fn verify(&self, digest: &HashDigest, signature: &RunSignature) -> Result<(), SignerError> {
        let key = self.keys.get(&signature.key_id).ok_or_else(|| {
            SignerError::Verify(format!("signature key '{}' not trusted", signature.key_id))
        })?;
        let message =
            canonical_json_bytes(digest).map_err(|err| SignerError::Verify(err.to_string()))?;
        let parsed = Signature::from_slice(&signature.signature)
            .map_err(|_| SignerError::Verify("invalid signature bytes".to_string()))?;
        key.verify_strict(&message, &parsed)
            .map_err(|_| SignerError::Verify("signature does not match digest".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads 32 key bytes from a raw or base64 file.
fn load_key_bytes(path: &Path) -> Result<[u8; KEY_LENGTH], KeyError> {
    let bytes =
        read_file_limited(path, MAX_KEY_FILE_BYTES).map_err(|err| KeyError::Io(err.to_string()))?;
    let decoded = if bytes.len() == KEY_LENGTH {
        bytes
    } else {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| KeyError::Invalid("key file must be raw bytes or base64".to_string()))?;
        Base64
            .decode(text.trim())
            .map_err(|_| KeyError::Invalid("key file is not valid base64".to_string()))?
    };
    decoded
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::Invalid(format!("expected {KEY_LENGTH} bytes, got {}", decoded.len())))
}
