// crates/story-gate-core/src/core/patterns.rs
// ============================================================================
// Module: Story Gate Pattern Library
// Description: Detection rule catalog grouped by finding category.
// Purpose: Compile operator-supplied rule data into an immutable scan catalog.
// Dependencies: regex, serde
// ============================================================================

//! ## Overview
//! A [`PatternLibraryDefinition`] is plain data (usually loaded from
//! configuration). [`PatternLibrary::compile`] validates it completely and
//! produces an immutable catalog; a failed compile never yields a partial
//! library. Reloading means compiling a new library and swapping it in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use regex::Regex;
use regex::RegexBuilder;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::finding::FindingCategory;
use crate::core::finding::SeverityTier;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::RuleId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default LOW tier threshold.
pub const DEFAULT_LOW_THRESHOLD: f64 = 0.3;
/// Default MEDIUM tier threshold.
pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.6;
/// Default HIGH tier threshold.
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.8;
/// Default confidence multiplier for fuzzy phrase matches.
pub const DEFAULT_FUZZY_FACTOR: f64 = 0.8;
/// Default number of filler tokens tolerated by fuzzy phrase matches.
pub const DEFAULT_FUZZY_MAX_GAP: usize = 2;
/// Maximum number of filler tokens a fuzzy match may skip.
pub const MAX_FUZZY_GAP: usize = 16;
/// Maximum number of rules accepted in one library.
pub const MAX_PATTERN_RULES: usize = 4_096;
/// Maximum length of a phrase or regex source.
pub const MAX_PATTERN_LENGTH: usize = 512;

// ============================================================================
// SECTION: Definitions
// ============================================================================

/// Numeric thresholds mapping a category score onto a severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeverityThresholds {
    /// Minimum score for LOW.
    pub low: f64,
    /// Minimum score for MEDIUM.
    pub medium: f64,
    /// Minimum score for HIGH.
    pub high: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_THRESHOLD,
            medium: DEFAULT_MEDIUM_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

impl SeverityThresholds {
    /// Maps a score onto a tier; scores below `low` produce no tier.
    #[must_use]
    pub fn tier_for(&self, score: f64) -> Option<SeverityTier> {
        if score >= self.high {
            Some(SeverityTier::High)
        } else if score >= self.medium {
            Some(SeverityTier::Medium)
        } else if score >= self.low {
            Some(SeverityTier::Low)
        } else {
            None
        }
    }

    /// Validates `0 < low < medium < high <= 1`.
    fn validate(&self) -> Result<(), PatternError> {
        let ordered = self.low > 0.0 && self.low < self.medium && self.medium < self.high;
        if !ordered || self.high > 1.0 {
            return Err(PatternError::Invalid(format!(
                "severity thresholds must satisfy 0 < low < medium < high <= 1 (got {}, {}, {})",
                self.low, self.medium, self.high
            )));
        }
        Ok(())
    }
}

/// Fuzzy phrase matching policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuzzyPolicy {
    /// Confidence multiplier applied to fuzzy (non-contiguous) matches.
    pub factor: f64,
    /// Maximum total filler tokens between phrase tokens.
    pub max_gap: usize,
}

impl Default for FuzzyPolicy {
    fn default() -> Self {
        Self {
            factor: DEFAULT_FUZZY_FACTOR,
            max_gap: DEFAULT_FUZZY_MAX_GAP,
        }
    }
}

/// Rule definition as supplied by operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternRuleDefinition {
    /// Unique rule identifier.
    pub id: RuleId,
    /// Category the rule contributes to.
    pub category: FindingCategory,
    /// Phrase matched case-insensitively over normalized tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
    /// Regular expression matched case-insensitively over raw text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Raw confidence in `[0, 1]` produced by an exact match.
    pub weight: f64,
    /// Marks matches as unconditionally dangerous (CRITICAL override).
    #[serde(default)]
    pub critical: bool,
    /// Example phrases the rule is expected to catch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// Complete pattern library definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternLibraryDefinition {
    /// Tier thresholds.
    #[serde(default)]
    pub thresholds: SeverityThresholds,
    /// Fuzzy matching policy.
    #[serde(default)]
    pub fuzzy: FuzzyPolicy,
    /// Ordered rule list; category order follows first appearance.
    #[serde(default)]
    pub rules: Vec<PatternRuleDefinition>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pattern library configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Library definition is invalid.
    #[error("invalid pattern library: {0}")]
    Invalid(String),
    /// A regex rule failed to compile.
    #[error("pattern rule {rule} has an invalid regex: {message}")]
    Regex {
        /// Rule identifier.
        rule: String,
        /// Compiler error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Compiled Library
// ============================================================================

/// Compiled matcher for a rule.
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    /// Normalized lowercase phrase tokens.
    Phrase(Vec<String>),
    /// Case-insensitive regex.
    Regex(Regex),
}

/// Compiled pattern rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    /// Rule identifier.
    pub id: RuleId,
    /// Rule category.
    pub category: FindingCategory,
    /// Compiled matcher.
    pub matcher: RuleMatcher,
    /// Raw confidence for exact matches.
    pub weight: f64,
    /// CRITICAL override flag.
    pub critical: bool,
    /// Example phrases.
    pub examples: Vec<String>,
}

/// Rules for one category in declaration order.
#[derive(Debug, Clone)]
pub struct CategoryRules {
    /// Category.
    pub category: FindingCategory,
    /// Rules in declaration order.
    pub rules: Vec<PatternRule>,
}

/// Immutable compiled pattern catalog.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    /// Tier thresholds.
    thresholds: SeverityThresholds,
    /// Fuzzy matching policy.
    fuzzy: FuzzyPolicy,
    /// Categories in declaration order.
    categories: Vec<CategoryRules>,
    /// Canonical digest of the source definition.
    digest: HashDigest,
}

impl PatternLibrary {
    /// Compiles and validates a library definition.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when any rule or threshold is invalid; nothing
    /// is compiled partially.
    pub fn compile(definition: &PatternLibraryDefinition) -> Result<Self, PatternError> {
        definition.thresholds.validate()?;
        let fuzzy = definition.fuzzy;
        if fuzzy.factor.is_nan() || fuzzy.factor <= 0.0 || fuzzy.factor > 1.0 {
            return Err(PatternError::Invalid("fuzzy factor must be in (0, 1]".to_string()));
        }
        if fuzzy.max_gap > MAX_FUZZY_GAP {
            return Err(PatternError::Invalid(format!(
                "fuzzy max_gap must not exceed {MAX_FUZZY_GAP}"
            )));
        }
        if definition.rules.len() > MAX_PATTERN_RULES {
            return Err(PatternError::Invalid(format!(
                "too many pattern rules (max {MAX_PATTERN_RULES})"
            )));
        }
        let mut seen = BTreeSet::new();
        let mut categories: Vec<CategoryRules> = Vec::new();
        for rule in &definition.rules {
            let compiled = compile_rule(rule)?;
            if !seen.insert(rule.id.clone()) {
                return Err(PatternError::Invalid(format!("duplicate rule id: {}", rule.id)));
            }
            if let Some(group) = categories.iter_mut().find(|group| group.category == rule.category)
            {
                group.rules.push(compiled);
            } else {
                categories.push(CategoryRules {
                    category: rule.category,
                    rules: vec![compiled],
                });
            }
        }
        let digest = hash_canonical_json(DEFAULT_HASH_ALGORITHM, definition)
            .map_err(|err| PatternError::Invalid(err.to_string()))?;
        Ok(Self {
            thresholds: definition.thresholds,
            fuzzy,
            categories,
            digest,
        })
    }

    /// Returns the built-in library.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the built-in catalog fails to compile.
    pub fn builtin() -> Result<Self, PatternError> {
        Self::compile(&builtin_definition())
    }

    /// Returns the tier thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> &SeverityThresholds {
        &self.thresholds
    }

    /// Returns the fuzzy policy.
    #[must_use]
    pub const fn fuzzy(&self) -> &FuzzyPolicy {
        &self.fuzzy
    }

    /// Returns the categories in declaration order.
    #[must_use]
    pub fn categories(&self) -> &[CategoryRules] {
        &self.categories
    }

    /// Returns the declaration position of a category (unknown categories sort last).
    #[must_use]
    pub fn category_position(&self, category: FindingCategory) -> usize {
        self.categories
            .iter()
            .position(|group| group.category == category)
            .unwrap_or(self.categories.len())
    }

    /// Returns the canonical digest of the definition this library was compiled from.
    #[must_use]
    pub const fn digest(&self) -> &HashDigest {
        &self.digest
    }

    /// Returns the total number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.categories.iter().map(|group| group.rules.len()).sum()
    }
}

/// Compiles a single rule definition.
fn compile_rule(rule: &PatternRuleDefinition) -> Result<PatternRule, PatternError> {
    if rule.id.as_str().trim().is_empty() {
        return Err(PatternError::Invalid("rule id must be non-empty".to_string()));
    }
    if !(0.0..=1.0).contains(&rule.weight) {
        return Err(PatternError::Invalid(format!("rule {} weight must be in [0, 1]", rule.id)));
    }
    let matcher = match (&rule.phrase, &rule.regex) {
        (Some(phrase), None) => {
            if phrase.len() > MAX_PATTERN_LENGTH {
                return Err(PatternError::Invalid(format!("rule {} phrase too long", rule.id)));
            }
            let tokens = phrase_tokens(phrase);
            if tokens.is_empty() {
                return Err(PatternError::Invalid(format!(
                    "rule {} phrase has no matchable tokens",
                    rule.id
                )));
            }
            RuleMatcher::Phrase(tokens)
        }
        (None, Some(source)) => {
            if source.len() > MAX_PATTERN_LENGTH {
                return Err(PatternError::Invalid(format!("rule {} regex too long", rule.id)));
            }
            let regex = RegexBuilder::new(source).case_insensitive(true).build().map_err(
                |err| PatternError::Regex {
                    rule: rule.id.to_string(),
                    message: err.to_string(),
                },
            )?;
            RuleMatcher::Regex(regex)
        }
        _ => {
            return Err(PatternError::Invalid(format!(
                "rule {} must define exactly one of phrase or regex",
                rule.id
            )));
        }
    };
    Ok(PatternRule {
        id: rule.id.clone(),
        category: rule.category,
        matcher,
        weight: rule.weight,
        critical: rule.critical,
        examples: rule.examples.clone(),
    })
}

/// Splits a phrase into lowercase alphanumeric tokens.
#[must_use]
pub fn phrase_tokens(phrase: &str) -> Vec<String> {
    phrase
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// ============================================================================
// SECTION: Built-in Catalog
// ============================================================================

/// Phrase rules shipped by default: `(id, category, phrase, weight, critical)`.
const BUILTIN_PHRASES: &[(&str, FindingCategory, &str, f64, bool)] = &[
    ("so-ignore-previous", FindingCategory::SystemOverride, "ignore previous instructions", 0.8, false),
    ("so-prompt-override", FindingCategory::SystemOverride, "system prompt override", 0.8, false),
    ("so-different", FindingCategory::SystemOverride, "you are now a different", 0.8, false),
    ("so-forget-role", FindingCategory::SystemOverride, "forget your previous role", 0.8, false),
    ("so-disregard", FindingCategory::SystemOverride, "disregard all prior", 0.8, false),
    ("so-override-prompt", FindingCategory::SystemOverride, "override system prompt", 0.8, false),
    ("jb-dan", FindingCategory::Jailbreak, "dan mode", 0.9, false),
    ("jb-developer-mode", FindingCategory::Jailbreak, "developer mode", 0.9, false),
    ("jb-unfiltered", FindingCategory::Jailbreak, "unfiltered response", 0.9, false),
    ("jb-no-restrictions", FindingCategory::Jailbreak, "no restrictions", 0.9, false),
    ("jb-bypass-safety", FindingCategory::Jailbreak, "bypass safety", 0.9, false),
    ("jb-uncensored", FindingCategory::Jailbreak, "uncensored mode", 0.9, false),
    ("ci-execute-code", FindingCategory::CodeInjection, "execute this code", 1.0, false),
    ("ci-run-command", FindingCategory::CodeInjection, "run this command", 1.0, false),
    ("ci-drop-database", FindingCategory::CodeInjection, "drop database", 1.0, true),
    ("ci-mkfs", FindingCategory::CodeInjection, "mkfs", 1.0, true),
    ("ci-format-c", FindingCategory::CodeInjection, "format c:", 1.0, true),
    ("cm-pretend", FindingCategory::ContextManipulation, "pretend you are", 0.6, false),
    ("cm-act-as-if", FindingCategory::ContextManipulation, "act as if", 0.6, false),
    ("cm-roleplay", FindingCategory::ContextManipulation, "roleplay as", 0.6, false),
    ("cm-imagine", FindingCategory::ContextManipulation, "imagine you are", 0.6, false),
    ("cm-from-now-on", FindingCategory::ContextManipulation, "from now on", 0.6, false),
    ("cm-personality", FindingCategory::ContextManipulation, "change your personality", 0.6, false),
    ("sl-dont-tell", FindingCategory::SuspiciousLanguage, "do not tell the user", 0.5, false),
    ("sl-secretly", FindingCategory::SuspiciousLanguage, "secretly", 0.3, false),
    ("sl-trust-me", FindingCategory::SuspiciousLanguage, "trust me", 0.3, false),
    ("sl-hide", FindingCategory::SuspiciousLanguage, "hide this from", 0.5, false),
];

/// Regex rules shipped by default: `(id, category, regex, weight, critical)`.
const BUILTIN_REGEXES: &[(&str, FindingCategory, &str, f64, bool)] = &[
    ("ci-import-os", FindingCategory::CodeInjection, r"\bimport\s+(os|subprocess|sys)\b", 0.8, false),
    ("ci-eval", FindingCategory::CodeInjection, r"\beval\s*\(", 0.8, false),
    ("ci-exec", FindingCategory::CodeInjection, r"\bexec\s*\(", 0.8, false),
    ("ci-subprocess", FindingCategory::CodeInjection, r"subprocess\.(call|run|popen)", 0.8, false),
    ("ci-dunder-import", FindingCategory::CodeInjection, r"__import__\s*\(", 0.8, false),
    ("ci-abs-open", FindingCategory::CodeInjection, r#"\bopen\s*\(\s*["']/"#, 0.6, false),
    ("ci-rm-root", FindingCategory::CodeInjection, r"\brm\s+-(rf|fr)\s+/(\*|\s|$)", 1.0, true),
    ("ci-fork-bomb", FindingCategory::CodeInjection, r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", 1.0, true),
    ("ci-dd-device", FindingCategory::CodeInjection, r"\bdd\s+if=\S+\s+of=/dev/(sd|hd|nvme)", 1.0, true),
];

/// Returns the built-in library definition.
#[must_use]
pub fn builtin_definition() -> PatternLibraryDefinition {
    let mut rules = Vec::with_capacity(BUILTIN_PHRASES.len() + BUILTIN_REGEXES.len());
    for (id, category, phrase, weight, critical) in BUILTIN_PHRASES {
        rules.push(PatternRuleDefinition {
            id: RuleId::new(*id),
            category: *category,
            phrase: Some((*phrase).to_string()),
            regex: None,
            weight: *weight,
            critical: *critical,
            examples: vec![(*phrase).to_string()],
        });
    }
    for (id, category, regex, weight, critical) in BUILTIN_REGEXES {
        rules.push(PatternRuleDefinition {
            id: RuleId::new(*id),
            category: *category,
            phrase: None,
            regex: Some((*regex).to_string()),
            weight: *weight,
            critical: *critical,
            examples: Vec::new(),
        });
    }
    let order = |rule: &PatternRuleDefinition| {
        FindingCategory::ALL.iter().position(|category| *category == rule.category)
    };
    rules.sort_by_key(order);
    PatternLibraryDefinition {
        thresholds: SeverityThresholds::default(),
        fuzzy: FuzzyPolicy::default(),
        rules,
    }
}
