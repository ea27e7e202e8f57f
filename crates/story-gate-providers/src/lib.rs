// crates/story-gate-providers/src/lib.rs
// ============================================================================
// Module: Story Gate Providers
// Description: Built-in file-backed collaborators and artifact signing.
// Purpose: Provide zero-config providers aligned with Story Gate core interfaces.
// Dependencies: story-gate-core, serde_json, serde_yaml, ed25519-dalek, base64
// ============================================================================

//! ## Overview
//! This crate ships the built-in implementations of the core collaborator
//! interfaces: a functional-check provider and an interaction log source that
//! read files from a confined root directory, plus an Ed25519 signer and
//! verifier for run evidence digests.
//! Invariants:
//! - File reads never leave the configured root and enforce size limits.
//! - Inputs are untrusted; malformed files fail closed with a provider error.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod files;
pub mod functional;
pub mod interactions;
pub mod signing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use files::DEFAULT_MAX_FILE_BYTES;
pub use functional::FileFunctionalCheckProvider;
pub use interactions::FileInteractionLogSource;
pub use signing::Ed25519ArtifactSigner;
pub use signing::Ed25519ArtifactVerifier;
pub use signing::KeyError;
