// crates/story-gate-core/src/runtime/claims.rs
// ============================================================================
// Module: Story Gate Claim Cross-Check
// Description: Extracts completion claims from agent output and checks evidence.
// Purpose: Flag agents that report work the evidence does not show.
// Dependencies: crate::core, regex
// ============================================================================

//! ## Overview
//! Claims are extracted line by line with case-insensitive patterns and
//! checked against the modified-artifact paths and the run's metric evidence.
//! A claim is only `Unsupported` when evidence contradicts it; missing
//! evidence yields `Unverifiable`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use regex::Regex;
use regex::RegexBuilder;

use crate::core::BaselineCheck;
use crate::core::Claim;
use crate::core::ClaimCheck;
use crate::core::ClaimKind;
use crate::core::ClaimStatus;
use crate::core::ClaimsPolicy;
use crate::core::MetricName;
use crate::core::PatternError;

// ============================================================================
// SECTION: Extractor
// ============================================================================

/// Compiled claim extraction patterns.
#[derive(Debug, Clone)]
pub struct ClaimExtractor {
    /// "fixed|resolved|addressed N ... error".
    errors_fixed: Regex,
    /// "added|implemented|created ... test".
    tests_added: Regex,
    /// "updated|modified <path>".
    file_modified: Regex,
    /// "coverage N%".
    coverage: Regex,
    /// "refactored|improved ...".
    refactoring: Regex,
    /// "documentation|docs updated|added".
    documentation: Regex,
}

/// Compiles a case-insensitive claim pattern.
fn claim_regex(source: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(source).case_insensitive(true).build().map_err(|err| PatternError::Regex {
        rule: "claims".to_string(),
        message: err.to_string(),
    })
}

impl ClaimExtractor {
    /// Compiles the extractor.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, PatternError> {
        Ok(Self {
            errors_fixed: claim_regex(r"\b(?:fixed|resolved|addressed)\s+(\d+)\s+.*?error")?,
            tests_added: claim_regex(r"\b(?:added|implemented|created)\s+\w.*?\btests?\b")?,
            file_modified: claim_regex(r"\b(?:updated|modified)\s+([\w./-]+\.\w+)")?,
            coverage: claim_regex(r"\bcoverage\s+(?:of\s+|to\s+|is\s+)?(\d+(?:\.\d+)?)\s*%")?,
            refactoring: claim_regex(r"\b(?:refactored|improved)\s+\S+")?,
            documentation: claim_regex(r"\b(?:documentation|docs)\s+(?:updated|added)")?,
        })
    }

    /// Extracts claims from ordered interaction texts.
    #[must_use]
    pub fn extract(&self, interactions: &[String]) -> Vec<Claim> {
        let mut claims = Vec::new();
        for (interaction, text) in interactions.iter().enumerate() {
            for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
                for kind in self.line_claims(line) {
                    claims.push(Claim {
                        kind,
                        text: line.to_string(),
                        interaction,
                    });
                }
            }
        }
        claims
    }

    /// Returns every claim kind found on one line.
    fn line_claims(&self, line: &str) -> Vec<ClaimKind> {
        let mut kinds = Vec::new();
        if let Some(count) = self
            .errors_fixed
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|value| value.as_str().parse::<u64>().ok())
        {
            kinds.push(ClaimKind::ErrorsFixed {
                count,
            });
        }
        if self.tests_added.is_match(line) {
            kinds.push(ClaimKind::TestsAdded);
        }
        if let Some(path) = self.file_modified.captures(line).and_then(|caps| caps.get(1)) {
            kinds.push(ClaimKind::FileModified {
                path: path.as_str().to_string(),
            });
        }
        if let Some(percent) = self
            .coverage
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|value| value.as_str().parse::<f64>().ok())
        {
            kinds.push(ClaimKind::Coverage {
                percent,
            });
        }
        if self.refactoring.is_match(line) {
            kinds.push(ClaimKind::Refactoring);
        }
        if self.documentation.is_match(line) {
            kinds.push(ClaimKind::DocumentationUpdated);
        }
        kinds
    }
}

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Evidence a claim can be checked against.
#[derive(Debug, Clone, Copy)]
pub struct ClaimEvidence<'a> {
    /// Modified artifact paths.
    pub modified_paths: &'a [String],
    /// Debt metrics reported by the functional check.
    pub debt_metrics: Option<&'a BTreeMap<MetricName, f64>>,
    /// Baseline checks from the regression gate.
    pub baseline_checks: &'a [BaselineCheck],
}

/// Checks every claim against the evidence.
#[must_use]
pub fn check_claims(
    claims: Vec<Claim>,
    evidence: &ClaimEvidence<'_>,
    policy: &ClaimsPolicy,
) -> Vec<ClaimCheck> {
    claims
        .into_iter()
        .map(|claim| {
            let (status, note) = check_claim(&claim.kind, evidence, policy);
            ClaimCheck {
                claim,
                status,
                note,
            }
        })
        .collect()
}

/// Checks one claim kind.
fn check_claim(
    kind: &ClaimKind,
    evidence: &ClaimEvidence<'_>,
    policy: &ClaimsPolicy,
) -> (ClaimStatus, String) {
    match kind {
        ClaimKind::ErrorsFixed {
            count,
        } => {
            let Some(check) = evidence
                .baseline_checks
                .iter()
                .find(|check| check.metric.as_str() == policy.error_metric)
            else {
                return (
                    ClaimStatus::Unverifiable,
                    format!("no baseline comparison for {}", policy.error_metric),
                );
            };
            let reduction = -check.delta;
            #[allow(clippy::cast_precision_loss, reason = "Claimed counts are small integers.")]
            let claimed = *count as f64;
            if reduction >= claimed {
                (ClaimStatus::Supported, format!("{} dropped by {reduction}", policy.error_metric))
            } else {
                (
                    ClaimStatus::Unsupported,
                    format!(
                        "claimed {count} fixed but {} changed by {}",
                        policy.error_metric, check.delta
                    ),
                )
            }
        }
        ClaimKind::TestsAdded => {
            if evidence.modified_paths.iter().any(|path| path.to_lowercase().contains("test")) {
                (ClaimStatus::Supported, "test artifacts modified".to_string())
            } else {
                (ClaimStatus::Unsupported, "claimed tests but no test files changed".to_string())
            }
        }
        ClaimKind::FileModified {
            path,
        } => {
            let touched = evidence
                .modified_paths
                .iter()
                .any(|modified| modified.ends_with(path.as_str()) || path.ends_with(modified.as_str()));
            if touched {
                (ClaimStatus::Supported, format!("{path} is in the modified set"))
            } else {
                (ClaimStatus::Unsupported, format!("{path} is not in the modified set"))
            }
        }
        ClaimKind::Coverage {
            percent,
        } => {
            let metric = MetricName::new(policy.coverage_metric.as_str());
            match evidence.debt_metrics.and_then(|metrics| metrics.get(&metric)) {
                Some(measured) if *measured >= *percent => {
                    (ClaimStatus::Supported, format!("measured coverage {measured}"))
                }
                Some(measured) => (
                    ClaimStatus::Unsupported,
                    format!("claimed {percent}% coverage but measured {measured}"),
                ),
                None => (ClaimStatus::Unverifiable, "coverage not measured".to_string()),
            }
        }
        ClaimKind::Refactoring => {
            (ClaimStatus::Unverifiable, "refactoring claims need manual review".to_string())
        }
        ClaimKind::DocumentationUpdated => {
            let documented = evidence.modified_paths.iter().any(|path| {
                let lower = path.to_lowercase();
                lower.ends_with(".md") || lower.contains("doc")
            });
            if documented {
                (ClaimStatus::Supported, "documentation artifacts modified".to_string())
            } else {
                (
                    ClaimStatus::Unsupported,
                    "claimed documentation but no doc files changed".to_string(),
                )
            }
        }
    }
}
