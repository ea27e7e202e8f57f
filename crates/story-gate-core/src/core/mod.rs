// crates/story-gate-core/src/core/mod.rs
// ============================================================================
// Module: Story Gate Core Types
// Description: Canonical story, finding, baseline, cost, and trust structures.
// Purpose: Provide stable, serializable types for validation artifacts and ledgers.
// Dependencies: serde, bigdecimal, regex
// ============================================================================

//! ## Overview
//! Core types define the validation artifact and the state it is derived
//! from. These types are the canonical source of truth for every store and
//! provider implementation.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod baseline;
pub mod claims;
pub mod cost;
pub mod finding;
pub mod hashing;
pub mod identifiers;
pub mod patterns;
pub mod story;
pub mod time;
pub mod trust;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use baseline::Baseline;
pub use baseline::BaselineCheck;
pub use baseline::BaselineEntry;
pub use baseline::BaselineOrigin;
pub use baseline::BaselineStatus;
pub use baseline::MetricPolarity;
pub use baseline::MetricRegistry;
pub use claims::Claim;
pub use claims::ClaimCheck;
pub use claims::ClaimKind;
pub use claims::ClaimStatus;
pub use claims::ClaimsPolicy;
pub use cost::Budget;
pub use cost::BudgetError;
pub use cost::BudgetPeriod;
pub use cost::BudgetStatus;
pub use cost::BudgetTier;
pub use cost::CostAggregate;
pub use cost::CostEvent;
pub use cost::CostFilter;
pub use cost::LedgerEntry;
pub use cost::ModelEfficiency;
pub use cost::ModelPricing;
pub use cost::Money;
pub use cost::Period;
pub use cost::PeriodError;
pub use cost::PricingError;
pub use cost::PricingTable;
pub use cost::RoiPercent;
pub use cost::RoiReport;
pub use cost::RoiValueModel;
pub use finding::Finding;
pub use finding::FindingCategory;
pub use finding::FindingCounts;
pub use finding::MatchedSpan;
pub use finding::SeverityTier;
pub use finding::SourceRef;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use identifiers::AgentId;
pub use identifiers::MetricName;
pub use identifiers::ModelId;
pub use identifiers::ProjectId;
pub use identifiers::RuleId;
pub use identifiers::RunId;
pub use identifiers::StoryId;
pub use patterns::FuzzyPolicy;
pub use patterns::PatternError;
pub use patterns::PatternLibrary;
pub use patterns::PatternLibraryDefinition;
pub use patterns::PatternRuleDefinition;
pub use patterns::SeverityThresholds;
pub use story::FailureReason;
pub use story::RunPhase;
pub use story::RunSignature;
pub use story::RunWarning;
pub use story::SignatureScheme;
pub use story::SkipReason;
pub use story::StageDetail;
pub use story::StageError;
pub use story::StageErrorCode;
pub use story::StageKind;
pub use story::StageOutcome;
pub use story::StageRecord;
pub use story::StageSet;
pub use story::Story;
pub use story::StoryState;
pub use story::ValidationMode;
pub use story::ValidationRun;
pub use story::Verdict;
pub use time::TimeWindow;
pub use time::Timestamp;
pub use trust::AgentOutcome;
pub use trust::AgentProfile;
pub use trust::TrustPolicy;
pub use trust::TrustScore;
