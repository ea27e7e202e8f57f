// system-tests/tests/persistence.rs
// ============================================================================
// Module: Persistence Suite
// Description: Aggregates restart and durability system tests.
// Purpose: Prove gate state survives a process restart over SQLite.
// Dependencies: suites/*, helpers
// ============================================================================

//! Persistence suite entry point for system-tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod helpers;

#[path = "suites/restart.rs"]
mod restart;
