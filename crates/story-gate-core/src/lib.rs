// crates/story-gate-core/src/lib.rs
// ============================================================================
// Module: Story Gate Core Library
// Description: Public API surface for the Story Gate core.
// Purpose: Expose core types, interfaces, and runtime engines.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Story Gate decides whether a unit of delegated work may be marked complete
//! by combining independent signals: a functional check, baseline regression
//! gates, claim cross-checks, adversarial-input scanning, and cost accounting.
//! The result of every decision is a hashed, append-only validation run.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::ArtifactSigner;
pub use interfaces::ArtifactVerifier;
pub use interfaces::BaselineStore;
pub use interfaces::CostLedgerStore;
pub use interfaces::FunctionalCheckProvider;
pub use interfaces::FunctionalReport;
pub use interfaces::InteractionLogSource;
pub use interfaces::LedgerAppendError;
pub use interfaces::ProviderError;
pub use interfaces::RunHistoryStore;
pub use interfaces::SeedOutcome;
pub use interfaces::SignerError;
pub use interfaces::StoreError;
pub use runtime::AuditEvent;
pub use runtime::AuditSink;
pub use runtime::BudgetMonitor;
pub use runtime::CostLedger;
pub use runtime::InMemoryBaselineStore;
pub use runtime::InMemoryCostLedgerStore;
pub use runtime::InMemoryRunHistoryStore;
pub use runtime::LedgerError;
pub use runtime::OrchestratorComponents;
pub use runtime::OrchestratorConfig;
pub use runtime::OrchestratorError;
pub use runtime::RegressionGate;
pub use runtime::SecurityScanner;
pub use runtime::TrustTracker;
pub use runtime::ValidationRequest;
pub use runtime::VerificationOrchestrator;
pub use runtime::VerificationReport;
pub use runtime::VerificationStatus;
pub use runtime::verify_run;
