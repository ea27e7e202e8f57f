// crates/story-gate-core/src/runtime/scanner.rs
// ============================================================================
// Module: Story Gate Security Scanner
// Description: Applies the pattern library to free text and scores findings.
// Purpose: Detect manipulation and injection attempts in agent interactions.
// Dependencies: crate::core, regex, tracing
// ============================================================================

//! ## Overview
//! The scanner is a pure function over the pattern library snapshot taken at
//! scan start. Phrase rules match case-insensitively over alphanumeric
//! tokens, with a bounded-gap fuzzy fallback; regex rules match the raw text.
//! Within a category the maximum rule confidence wins, so repeated
//! near-duplicate phrases never inflate severity.
//!
//! ## Invariants
//! - A matched rule tagged critical always yields a CRITICAL finding.
//! - Scores below the LOW threshold yield no finding.
//! - Output is ordered by tier (highest first), then category declaration order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tracing::debug;

use crate::core::Finding;
use crate::core::FindingCategory;
use crate::core::MatchedSpan;
use crate::core::PatternLibrary;
use crate::core::SeverityTier;
use crate::core::SourceRef;
use crate::core::patterns::CategoryRules;
use crate::core::patterns::FuzzyPolicy;
use crate::core::patterns::PatternRule;
use crate::core::patterns::RuleMatcher;
use crate::runtime::snapshot::SnapshotCell;

// ============================================================================
// SECTION: Scanner
// ============================================================================

/// Security scanner over a reloadable pattern library.
#[derive(Debug)]
pub struct SecurityScanner {
    /// Current pattern library snapshot.
    library: SnapshotCell<PatternLibrary>,
}

impl SecurityScanner {
    /// Creates a scanner over a compiled library.
    #[must_use]
    pub fn new(library: PatternLibrary) -> Self {
        Self {
            library: SnapshotCell::new(library),
        }
    }

    /// Returns the current library snapshot.
    #[must_use]
    pub fn library(&self) -> Arc<PatternLibrary> {
        self.library.load()
    }

    /// Swaps in a new library; scans already in progress keep their snapshot.
    pub fn reload(&self, library: PatternLibrary) -> Arc<PatternLibrary> {
        self.library.swap(library)
    }

    /// Scans one text.
    #[must_use]
    pub fn scan(&self, text: &str) -> Vec<Finding> {
        let library = self.library.load();
        let mut findings = scan_with(&library, text, None);
        order_findings(&library, &mut findings);
        findings
    }

    /// Scans an ordered interaction set and aggregates per category.
    ///
    /// Each category keeps its strongest finding (first occurrence on ties)
    /// and sums match counts across interactions.
    #[must_use]
    pub fn scan_interaction_set(&self, texts: &[String]) -> Vec<Finding> {
        let library = self.library.load();
        let mut aggregated: Vec<Finding> = Vec::new();
        for (index, text) in texts.iter().enumerate() {
            for finding in scan_with(&library, text, Some(index)) {
                merge_finding(&mut aggregated, finding);
            }
        }
        order_findings(&library, &mut aggregated);
        debug!(
            interactions = texts.len(),
            findings = aggregated.len(),
            library = %library.digest(),
            "scanned interaction set"
        );
        aggregated
    }
}

// ============================================================================
// SECTION: Scanning
// ============================================================================

/// Token with byte offsets into the source text.
#[derive(Debug, Clone)]
struct Token {
    /// Lowercased token text.
    text: String,
    /// Inclusive start byte offset.
    start: usize,
    /// Exclusive end byte offset.
    end: usize,
}

/// Single rule match.
#[derive(Debug, Clone)]
struct RuleHit {
    /// Raw confidence.
    confidence: f64,
    /// Span of the first match.
    start: usize,
    /// Span end of the first match.
    end: usize,
    /// Number of matches.
    count: u32,
}

/// Scans a text against every category in `library`.
fn scan_with(library: &PatternLibrary, text: &str, interaction: Option<usize>) -> Vec<Finding> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let tokens = tokenize(text);
    let mut findings = Vec::new();
    for group in library.categories() {
        if let Some(finding) = scan_category(library, group, text, &tokens, interaction) {
            findings.push(finding);
        }
    }
    findings
}

/// Scans one category and combines its rule hits.
fn scan_category(
    library: &PatternLibrary,
    group: &CategoryRules,
    text: &str,
    tokens: &[Token],
    interaction: Option<usize>,
) -> Option<Finding> {
    let mut best: Option<RuleHit> = None;
    let mut rule_ids = Vec::new();
    let mut critical = false;
    let mut match_count = 0_u32;
    for rule in &group.rules {
        let Some(hit) = match_rule(rule, text, tokens, library.fuzzy()) else {
            continue;
        };
        rule_ids.push(rule.id.clone());
        critical |= rule.critical;
        match_count = match_count.saturating_add(hit.count);
        if best.as_ref().is_none_or(|current| hit.confidence > current.confidence) {
            best = Some(hit);
        }
    }
    let best = best?;
    let tier = if critical {
        SeverityTier::Critical
    } else {
        library.thresholds().tier_for(best.confidence)?
    };
    Some(Finding {
        category: group.category,
        tier,
        score: best.confidence,
        span: MatchedSpan {
            start: best.start,
            end: best.end,
            text: text[best.start..best.end].to_string(),
        },
        source: SourceRef {
            interaction,
        },
        rule_ids,
        match_count,
    })
}

/// Matches a single rule against the text.
fn match_rule(
    rule: &PatternRule,
    text: &str,
    tokens: &[Token],
    fuzzy: &FuzzyPolicy,
) -> Option<RuleHit> {
    match &rule.matcher {
        RuleMatcher::Regex(regex) => {
            let mut matches = regex.find_iter(text);
            let first = matches.next()?;
            let rest = u32::try_from(matches.count()).unwrap_or(u32::MAX);
            Some(RuleHit {
                confidence: rule.weight,
                start: first.start(),
                end: first.end(),
                count: rest.saturating_add(1),
            })
        }
        RuleMatcher::Phrase(phrase) => {
            let exact = exact_matches(tokens, phrase);
            if let Some((first_start, first_end)) = exact.first().copied() {
                return Some(RuleHit {
                    confidence: rule.weight,
                    start: tokens[first_start].start,
                    end: tokens[first_end].end,
                    count: u32::try_from(exact.len()).unwrap_or(u32::MAX),
                });
            }
            let (first, last) = fuzzy_match(tokens, phrase, fuzzy.max_gap)?;
            Some(RuleHit {
                confidence: rule.weight * fuzzy.factor,
                start: tokens[first].start,
                end: tokens[last].end,
                count: 1,
            })
        }
    }
}

/// Returns non-overlapping contiguous matches as `(first, last)` token indices.
fn exact_matches(tokens: &[Token], phrase: &[String]) -> Vec<(usize, usize)> {
    let mut matches = Vec::new();
    if phrase.is_empty() || tokens.len() < phrase.len() {
        return matches;
    }
    let mut index = 0;
    while index + phrase.len() <= tokens.len() {
        let window = &tokens[index..index + phrase.len()];
        if window.iter().zip(phrase).all(|(token, expected)| token.text == *expected) {
            matches.push((index, index + phrase.len() - 1));
            index += phrase.len();
        } else {
            index += 1;
        }
    }
    matches
}

/// Finds the first in-order match tolerating up to `max_gap` filler tokens in total.
fn fuzzy_match(tokens: &[Token], phrase: &[String], max_gap: usize) -> Option<(usize, usize)> {
    let (head, tail) = phrase.split_first()?;
    for (start, token) in tokens.iter().enumerate() {
        if token.text != *head {
            continue;
        }
        let mut position = start;
        let mut gap_used = 0;
        let mut complete = true;
        for expected in tail {
            let budget = max_gap.saturating_sub(gap_used);
            let upper = position
                .saturating_add(1)
                .saturating_add(budget)
                .min(tokens.len().saturating_sub(1));
            let found = (position + 1..=upper).find(|candidate| tokens[*candidate].text == *expected);
            if let Some(next) = found {
                gap_used += next - position - 1;
                position = next;
            } else {
                complete = false;
                break;
            }
        }
        if complete {
            return Some((start, position));
        }
    }
    None
}

/// Splits text into lowercase alphanumeric tokens with byte offsets.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<(usize, String)> = None;
    for (offset, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            match current.as_mut() {
                Some((_, buffer)) => buffer.extend(ch.to_lowercase()),
                None => current = Some((offset, ch.to_lowercase().collect())),
            }
        } else if let Some((start, buffer)) = current.take() {
            tokens.push(Token {
                text: buffer,
                start,
                end: offset,
            });
        }
    }
    if let Some((start, buffer)) = current {
        tokens.push(Token {
            text: buffer,
            start,
            end: text.len(),
        });
    }
    tokens
}

// ============================================================================
// SECTION: Ordering and Aggregation
// ============================================================================

/// Orders findings by tier (highest first), then category declaration order.
fn order_findings(library: &PatternLibrary, findings: &mut [Finding]) {
    findings.sort_by(|left, right| {
        right
            .tier
            .cmp(&left.tier)
            .then_with(|| {
                library
                    .category_position(left.category)
                    .cmp(&library.category_position(right.category))
            })
    });
}

/// Merges a finding into the per-category aggregate.
fn merge_finding(aggregated: &mut Vec<Finding>, finding: Finding) {
    let Some(existing) = aggregated.iter_mut().find(|entry| entry.category == finding.category)
    else {
        aggregated.push(finding);
        return;
    };
    let match_count = existing.match_count.saturating_add(finding.match_count);
    let mut rule_ids = existing.rule_ids.clone();
    for rule_id in &finding.rule_ids {
        if !rule_ids.contains(rule_id) {
            rule_ids.push(rule_id.clone());
        }
    }
    if stronger(&finding, existing) {
        *existing = finding;
    }
    existing.match_count = match_count;
    existing.rule_ids = rule_ids;
}

/// Returns true when `candidate` outranks `current` for the same category.
fn stronger(candidate: &Finding, current: &Finding) -> bool {
    candidate.tier > current.tier
        || (candidate.tier == current.tier && candidate.score > current.score)
}

/// Returns the categories that produced blocking findings, in output order.
#[must_use]
pub fn blocking_categories(findings: &[Finding]) -> Vec<FindingCategory> {
    findings
        .iter()
        .filter(|finding| finding.tier.is_blocking())
        .map(|finding| finding.category)
        .collect()
}
