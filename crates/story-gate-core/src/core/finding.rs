// crates/story-gate-core/src/core/finding.rs
// ============================================================================
// Module: Story Gate Findings
// Description: Security finding records produced by the scanner.
// Purpose: Provide serializable, ordered finding records for evidence bundles.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Finding`] records one category-level detection over a piece of
//! interaction text: the category, the severity tier, the combined score, the
//! strongest matched span, and the rule identifiers that fired.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RuleId;

// ============================================================================
// SECTION: Category
// ============================================================================

/// Detection category for pattern rules and findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// Attempts to replace or discard the system instructions.
    SystemOverride,
    /// Attempts to disable safety restrictions.
    Jailbreak,
    /// Attempts to execute code or shell commands.
    CodeInjection,
    /// Attempts to change the agent's role or persona.
    ContextManipulation,
    /// Language that asks for concealment or unverifiable trust.
    SuspiciousLanguage,
}

impl FindingCategory {
    /// All categories in their canonical declaration order.
    pub const ALL: [Self; 5] = [
        Self::SystemOverride,
        Self::Jailbreak,
        Self::CodeInjection,
        Self::ContextManipulation,
        Self::SuspiciousLanguage,
    ];

    /// Returns the stable label for the category.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SystemOverride => "system_override",
            Self::Jailbreak => "jailbreak",
            Self::CodeInjection => "code_injection",
            Self::ContextManipulation => "context_manipulation",
            Self::SuspiciousLanguage => "suspicious_language",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Severity
// ============================================================================

/// Severity tier assigned to a finding.
///
/// # Invariants
/// - Ordering is `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityTier {
    /// Low severity.
    Low,
    /// Medium severity.
    Medium,
    /// High severity; blocks verification.
    High,
    /// Critical severity; blocks verification.
    Critical,
}

impl SeverityTier {
    /// Returns true when the tier blocks a story from verification.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Finding
// ============================================================================

/// Byte span of matched text inside the scanned source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedSpan {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
    /// Matched source text.
    pub text: String,
}

/// Reference to the text a finding was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Index into the interaction sequence, when scanning a set.
    pub interaction: Option<usize>,
}

/// Single category-level security detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Detection category.
    pub category: FindingCategory,
    /// Assigned severity tier.
    pub tier: SeverityTier,
    /// Combined category score in `[0, 1]` (maximum rule confidence).
    pub score: f64,
    /// Strongest matched span.
    pub span: MatchedSpan,
    /// Source text reference.
    pub source: SourceRef,
    /// Rules that matched, in library order.
    pub rule_ids: Vec<RuleId>,
    /// Total number of rule matches combined into this finding.
    pub match_count: u32,
}

/// Per-tier finding counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingCounts {
    /// LOW findings.
    pub low: u32,
    /// MEDIUM findings.
    pub medium: u32,
    /// HIGH findings.
    pub high: u32,
    /// CRITICAL findings.
    pub critical: u32,
}

impl FindingCounts {
    /// Counts findings by tier.
    #[must_use]
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            counts.add(finding.tier, 1);
        }
        counts
    }

    /// Adds `amount` findings at `tier`.
    pub const fn add(&mut self, tier: SeverityTier, amount: u32) {
        let slot = match tier {
            SeverityTier::Low => &mut self.low,
            SeverityTier::Medium => &mut self.medium,
            SeverityTier::High => &mut self.high,
            SeverityTier::Critical => &mut self.critical,
        };
        *slot = slot.saturating_add(amount);
    }

    /// Adds every counter from another tally.
    pub const fn merge(&mut self, other: Self) {
        self.add(SeverityTier::Low, other.low);
        self.add(SeverityTier::Medium, other.medium);
        self.add(SeverityTier::High, other.high);
        self.add(SeverityTier::Critical, other.critical);
    }
}
