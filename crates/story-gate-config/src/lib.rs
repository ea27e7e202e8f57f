// crates/story-gate-config/src/lib.rs
// ============================================================================
// Module: Story Gate Config Library
// Description: Canonical config model, validation, and snapshot conversion.
// Purpose: Single source of truth for story-gate.toml semantics.
// Dependencies: story-gate-core, story-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `story-gate-config` defines the configuration model for Story Gate. It
//! provides strict, fail-closed validation and converts a validated file into
//! the immutable snapshots the core engines consume. [`ConfigHandle`] swaps a
//! new snapshot in only after the replacement file validated completely.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod snapshot;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use snapshot::ConfigHandle;
pub use snapshot::GateSnapshot;
