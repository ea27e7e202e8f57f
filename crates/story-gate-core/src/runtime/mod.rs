// crates/story-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Story Gate Runtime
// Description: Verification engine, gates, ledgers, and supporting helpers.
// Purpose: Execute story validation against providers and stores.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the verification orchestrator and the engines it
//! sequences: security scanning, baseline regression checks, claim
//! cross-checks, cost accounting, and trust tracking. Configuration that can
//! be reloaded lives behind [`snapshot::SnapshotCell`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod baseline;
pub mod budget;
pub mod claims;
pub mod engine;
pub mod ledger;
pub mod scanner;
pub mod snapshot;
pub mod store;
pub mod trust;
pub mod verifier;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEvent;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::InMemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use baseline::RegressionGate;
pub use budget::BudgetMonitor;
pub use budget::validate_budgets;
pub use claims::ClaimEvidence;
pub use claims::ClaimExtractor;
pub use claims::check_claims;
pub use engine::DEFAULT_FUNCTIONAL_TIMEOUT;
pub use engine::OrchestratorComponents;
pub use engine::OrchestratorConfig;
pub use engine::OrchestratorError;
pub use engine::ValidationRequest;
pub use engine::VerificationOrchestrator;
pub use ledger::CostLedger;
pub use ledger::LedgerError;
pub use scanner::SecurityScanner;
pub use scanner::blocking_categories;
pub use snapshot::SnapshotCell;
pub use store::InMemoryBaselineStore;
pub use store::InMemoryCostLedgerStore;
pub use store::InMemoryRunHistoryStore;
pub use trust::TrustTracker;
pub use verifier::VerificationReport;
pub use verifier::VerificationStatus;
pub use verifier::verify_run;
