// crates/story-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Story Gate SQLite Store
// Description: Durable store backends using SQLite WAL.
// Purpose: Persist baselines, cost events, and validation runs across restarts.
// Dependencies: story-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides one `SQLite` database implementing the baseline
//! history, cost ledger, and run history interfaces from `story-gate-core`.
//! Every payload is stored as canonical JSON next to its hash, and loads fail
//! closed when the two disagree.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_PAYLOAD_BYTES;
pub use store::SqliteGateStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
