// system-tests/src/lib.rs
// ============================================================================
// Module: Story Gate System Tests Library
// Description: Shared configuration and helpers for system test scenarios.
// Purpose: Provide common utilities for Story Gate system-test binaries.
// Dependencies: std
// ============================================================================

//! ## Overview
//! This crate hosts shared configuration used by the Story Gate system-tests
//! binaries in `system-tests/tests`. The suites wire the real config loader,
//! file providers, `SQLite` store, and orchestrator together.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
