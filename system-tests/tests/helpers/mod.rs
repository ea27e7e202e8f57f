// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared helpers for Story Gate system-tests.
// Purpose: Provide gate workspaces, wiring, and artifact utilities.
// Dependencies: system-tests, story-gate-*
// ============================================================================

//! ## Overview
//! Shared helpers for Story Gate system-tests.
//! Invariants:
//! - Every test runs against its own temporary workspace and database.
//! - The gate is wired exactly as a host would wire it from `story-gate.toml`.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod artifacts;
pub mod harness;
