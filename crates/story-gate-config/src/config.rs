// crates/story-gate-config/src/config.rs
// ============================================================================
// Module: Story Gate Configuration
// Description: Configuration loading and validation for Story Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: story-gate-core, story-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section defaults to a usable value, unknown keys are rejected, and
//! invalid values fail the whole load. Money values accept TOML numbers or
//! decimal strings and are converted to exact decimals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use story_gate_core::AuditSink;
use story_gate_core::Budget;
use story_gate_core::BudgetPeriod;
use story_gate_core::ClaimsPolicy;
use story_gate_core::FuzzyPolicy;
use story_gate_core::MetricName;
use story_gate_core::MetricPolarity;
use story_gate_core::MetricRegistry;
use story_gate_core::ModelId;
use story_gate_core::ModelPricing;
use story_gate_core::Money;
use story_gate_core::OrchestratorConfig;
use story_gate_core::PatternLibrary;
use story_gate_core::PatternLibraryDefinition;
use story_gate_core::PatternRuleDefinition;
use story_gate_core::PricingTable;
use story_gate_core::ProjectId;
use story_gate_core::RoiValueModel;
use story_gate_core::SeverityThresholds;
use story_gate_core::StageKind;
use story_gate_core::StageSet;
use story_gate_core::TrustPolicy;
use story_gate_core::patterns::builtin_definition;
use story_gate_core::runtime::FileAuditSink;
use story_gate_core::runtime::NoopAuditSink;
use story_gate_core::runtime::StderrAuditSink;
use story_gate_core::runtime::DEFAULT_FUNCTIONAL_TIMEOUT;
use story_gate_core::runtime::validate_budgets;
use story_gate_core::trust::DEFAULT_CRITICAL_PENALTY;
use story_gate_core::trust::DEFAULT_DECAY;
use story_gate_core::trust::DEFAULT_HIGH_PENALTY;
use story_gate_store_sqlite::SqliteStoreConfig;
use story_gate_store_sqlite::SqliteStoreMode;
use story_gate_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "story-gate.toml";
/// Environment variable naming the config file.
pub(crate) const CONFIG_ENV_VAR: &str = "STORY_GATE_CONFIG";
/// Maximum config and pattern file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum project identifier length.
const MAX_PROJECT_ID_LENGTH: usize = 128;
/// Maximum number of custom modes.
const MAX_MODES: usize = 64;
/// Maximum functional timeout (one hour).
const MAX_TIMEOUT_MS: u64 = 3_600_000;
/// Default warning fraction for budgets.
const DEFAULT_WARNING_FRACTION: f64 = 0.8;
/// Default critical fraction for budgets.
const DEFAULT_CRITICAL_FRACTION: f64 = 0.95;
/// Default busy timeout for the `SQLite` store.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Story Gate configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoryGateConfig {
    /// Project identity.
    #[serde(default)]
    pub project: ProjectConfig,
    /// Security scanner configuration.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Model pricing table.
    #[serde(default)]
    pub pricing: PricingConfig,
    /// Budgets with alert fractions.
    #[serde(default)]
    pub budgets: Vec<BudgetConfig>,
    /// ROI value model.
    #[serde(default)]
    pub roi: RoiConfig,
    /// Trust scoring policy.
    #[serde(default)]
    pub trust: TrustConfig,
    /// Baseline metric polarities.
    #[serde(default)]
    pub baseline: BaselineConfig,
    /// Orchestrator settings.
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    /// File-backed provider locations.
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Audit sink selection.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Persistent store selection.
    #[serde(default)]
    pub store: StoreConfig,
    /// Directory relative paths are resolved against (not serialized).
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl StoryGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        let content = read_limited_utf8(&resolved, "config")?;
        let mut config: Self =
            toml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.base_dir = resolved.parent().map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text; relative paths stay relative.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.project.validate()?;
        self.security.validate()?;
        self.pricing_table()?;
        self.budget_set()?;
        self.roi.value_model()?;
        self.trust.validate()?;
        self.orchestrator_config()?;
        self.providers.validate()?;
        self.audit.validate()?;
        self.store.validate()?;
        Ok(())
    }

    /// Resolves a configured path against the config file directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Returns the project identifier.
    #[must_use]
    pub fn project_id(&self) -> ProjectId {
        ProjectId::new(self.project.id.trim())
    }

    /// Builds the pricing table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a rate is malformed.
    pub fn pricing_table(&self) -> Result<PricingTable, ConfigError> {
        self.pricing.table()
    }

    /// Builds the validated budget set in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a budget is malformed or duplicated.
    pub fn budget_set(&self) -> Result<Vec<Budget>, ConfigError> {
        let budgets =
            self.budgets.iter().map(BudgetConfig::budget).collect::<Result<Vec<_>, _>>()?;
        validate_budgets(&budgets).map_err(|err| ConfigError::Invalid(format!("budgets: {err}")))?;
        Ok(budgets)
    }

    /// Builds the trust policy.
    #[must_use]
    pub const fn trust_policy(&self) -> TrustPolicy {
        self.trust.policy()
    }

    /// Builds the metric registry.
    #[must_use]
    pub fn metric_registry(&self) -> MetricRegistry {
        self.baseline.registry()
    }

    /// Builds the orchestrator configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the orchestrator section is invalid.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        self.orchestrator.build()
    }

    /// Builds the pattern library, reading the pattern file when configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the pattern file cannot be read or the
    /// combined catalog fails to compile.
    pub fn pattern_library(&self) -> Result<PatternLibrary, ConfigError> {
        let file = match &self.security.pattern_file {
            Some(path) => Some(load_pattern_file(&self.resolve(path))?),
            None => None,
        };
        self.security.compile(file)
    }

    /// Opens the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn audit_sink(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        match (self.audit.sink, &self.audit.path) {
            (AuditSinkKind::File, Some(path)) => {
                let sink = FileAuditSink::new(&self.resolve(path))
                    .map_err(|err| ConfigError::Io(format!("audit file: {err}")))?;
                Ok(Arc::new(sink))
            }
            (AuditSinkKind::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            _ => Ok(Arc::new(NoopAuditSink)),
        }
    }

    /// Returns the resolved `SQLite` configuration, or `None` for the memory store.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store.store_type, &self.store.path) {
            (StoreType::Sqlite, Some(path)) => Some(self.store.sqlite_config(self.resolve(path))),
            _ => None,
        }
    }
}

/// Project identity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project identifier used to scope baselines.
    #[serde(default = "default_project_id")]
    pub id: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            id: default_project_id(),
        }
    }
}

impl ProjectConfig {
    /// Validates the project identifier.
    fn validate(&self) -> Result<(), ConfigError> {
        let trimmed = self.id.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::Invalid("project.id must be non-empty".to_string()));
        }
        if trimmed.len() > MAX_PROJECT_ID_LENGTH {
            return Err(ConfigError::Invalid("project.id exceeds max length".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Security
// ============================================================================

/// Security scanner configuration.
///
/// The catalog is the built-in rules (unless disabled), then the rules from
/// `pattern_file`, then inline `rules`, in that order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Start from the built-in catalog.
    #[serde(default = "default_true")]
    pub builtin: bool,
    /// Optional TOML or JSON pattern library file.
    #[serde(default)]
    pub pattern_file: Option<PathBuf>,
    /// Tier threshold override.
    #[serde(default)]
    pub thresholds: Option<SeverityThresholds>,
    /// Fuzzy matching override.
    #[serde(default)]
    pub fuzzy: Option<FuzzyPolicy>,
    /// Inline rules.
    #[serde(default)]
    pub rules: Vec<PatternRuleDefinition>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            builtin: true,
            pattern_file: None,
            thresholds: None,
            fuzzy: None,
            rules: Vec::new(),
        }
    }
}

impl SecurityConfig {
    /// Validates everything that does not require the pattern file.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.pattern_file {
            validate_path_string("security.pattern_file", &path.to_string_lossy())?;
            return Ok(());
        }
        self.compile(None).map(|_| ())
    }

    /// Combines the configured sources and compiles the library.
    fn compile(&self, file: Option<PatternLibraryDefinition>) -> Result<PatternLibrary, ConfigError> {
        let mut definition = if self.builtin {
            builtin_definition()
        } else {
            PatternLibraryDefinition::default()
        };
        if let Some(file) = file {
            definition.thresholds = file.thresholds;
            definition.fuzzy = file.fuzzy;
            definition.rules.extend(file.rules);
        }
        if let Some(thresholds) = self.thresholds {
            definition.thresholds = thresholds;
        }
        if let Some(fuzzy) = self.fuzzy {
            definition.fuzzy = fuzzy;
        }
        definition.rules.extend(self.rules.iter().cloned());
        if definition.rules.is_empty() {
            return Err(ConfigError::Invalid(
                "security catalog has no rules; enable builtin or add rules".to_string(),
            ));
        }
        PatternLibrary::compile(&definition)
            .map_err(|err| ConfigError::Invalid(format!("security: {err}")))
    }
}

/// Reads a pattern library file as JSON (`.json`) or TOML.
fn load_pattern_file(path: &Path) -> Result<PatternLibraryDefinition, ConfigError> {
    let content = read_limited_utf8(path, "pattern file")?;
    let is_json = path.extension().is_some_and(|extension| extension == "json");
    if is_json {
        serde_json::from_str(&content)
            .map_err(|err| ConfigError::Parse(format!("pattern file: {err}")))
    } else {
        toml::from_str(&content).map_err(|err| ConfigError::Parse(format!("pattern file: {err}")))
    }
}

// ============================================================================
// SECTION: Pricing and Budgets
// ============================================================================

/// Money value written as a TOML number or a decimal string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MoneyValue {
    /// Numeric value, converted through its shortest decimal rendering.
    Number(f64),
    /// Decimal string, parsed exactly.
    Text(String),
}

impl MoneyValue {
    /// Converts the value into exact money.
    fn to_money(&self, field: &str) -> Result<Money, ConfigError> {
        let money = match self {
            Self::Number(value) => Money::from_f64(*value),
            Self::Text(value) => Money::parse(value),
        }
        .map_err(|err| ConfigError::Invalid(format!("{field}: {err}")))?;
        if money < Money::zero() {
            return Err(ConfigError::Invalid(format!("{field} must be non-negative")));
        }
        Ok(money)
    }
}

impl From<f64> for MoneyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Model pricing table configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Include the default model catalog; explicit models override it.
    #[serde(default = "default_true")]
    pub include_defaults: bool,
    /// Rates keyed by model identifier.
    #[serde(default)]
    pub models: BTreeMap<String, ModelRateConfig>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            include_defaults: true,
            models: BTreeMap::new(),
        }
    }
}

impl PricingConfig {
    /// Builds the pricing table.
    fn table(&self) -> Result<PricingTable, ConfigError> {
        let mut models = BTreeMap::new();
        if self.include_defaults {
            for (model, input, output) in DEFAULT_MODEL_RATES {
                models.insert(
                    ModelId::new(*model),
                    ModelPricing {
                        input_per_1k: MoneyValue::Text((*input).to_string())
                            .to_money("pricing.defaults")?,
                        output_per_1k: MoneyValue::Text((*output).to_string())
                            .to_money("pricing.defaults")?,
                    },
                );
            }
        }
        for (model, rates) in &self.models {
            let field = format!("pricing.models.{model}");
            models.insert(
                ModelId::new(model.trim()),
                ModelPricing {
                    input_per_1k: rates.input_per_1k.to_money(&format!("{field}.input_per_1k"))?,
                    output_per_1k: rates
                        .output_per_1k
                        .to_money(&format!("{field}.output_per_1k"))?,
                },
            );
        }
        PricingTable::new(models).map_err(|err| ConfigError::Invalid(format!("pricing: {err}")))
    }
}

/// Default per-1k token rates for common models.
const DEFAULT_MODEL_RATES: &[(&str, &str, &str)] = &[
    ("claude-opus-4", "0.015", "0.075"),
    ("claude-sonnet-4", "0.003", "0.015"),
    ("gpt-4-turbo", "0.01", "0.03"),
    ("gpt-4o", "0.005", "0.015"),
    ("gpt-4o-mini", "0.00015", "0.0006"),
];

/// Per-model rates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRateConfig {
    /// Rate per 1,000 input tokens.
    pub input_per_1k: MoneyValue,
    /// Rate per 1,000 output tokens.
    pub output_per_1k: MoneyValue,
}

/// Budget configuration entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Budget period.
    pub period: BudgetPeriod,
    /// Spending ceiling.
    pub ceiling: MoneyValue,
    /// Fraction of the ceiling raising a WARNING.
    #[serde(default = "default_warning_fraction")]
    pub warning: MoneyValue,
    /// Fraction of the ceiling raising a CRITICAL alert.
    #[serde(default = "default_critical_fraction")]
    pub critical: MoneyValue,
}

impl BudgetConfig {
    /// Converts the entry into a core budget.
    fn budget(&self) -> Result<Budget, ConfigError> {
        let field = format!("budgets.{}", self.period);
        Ok(Budget {
            period: self.period,
            ceiling: self.ceiling.to_money(&format!("{field}.ceiling"))?,
            warning_fraction: self.warning.to_money(&format!("{field}.warning"))?,
            critical_fraction: self.critical.to_money(&format!("{field}.critical"))?,
        })
    }
}

/// ROI value model configuration; unset fields keep the defaults.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoiConfig {
    /// Value of one saved hour.
    #[serde(default)]
    pub hourly_rate: Option<MoneyValue>,
    /// Hours saved per unit of spend.
    #[serde(default)]
    pub hours_per_cost_unit: Option<MoneyValue>,
    /// Cap on hours saved per story.
    #[serde(default)]
    pub max_hours: Option<MoneyValue>,
}

impl RoiConfig {
    /// Builds the value model.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is malformed or negative.
    pub fn value_model(&self) -> Result<RoiValueModel, ConfigError> {
        let defaults = RoiValueModel::default();
        let pick = |value: &Option<MoneyValue>, field: &str, fallback: Money| match value {
            Some(value) => value.to_money(field),
            None => Ok(fallback),
        };
        Ok(RoiValueModel {
            hourly_rate: pick(&self.hourly_rate, "roi.hourly_rate", defaults.hourly_rate)?,
            hours_per_cost_unit: pick(
                &self.hours_per_cost_unit,
                "roi.hours_per_cost_unit",
                defaults.hours_per_cost_unit,
            )?,
            max_hours: pick(&self.max_hours, "roi.max_hours", defaults.max_hours)?,
        })
    }
}

// ============================================================================
// SECTION: Trust and Baselines
// ============================================================================

/// Trust scoring configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// Penalty per HIGH finding.
    #[serde(default = "default_high_penalty")]
    pub high_penalty: f64,
    /// Penalty per CRITICAL finding.
    #[serde(default = "default_critical_penalty")]
    pub critical_penalty: f64,
    /// Decay per later validation run.
    #[serde(default = "default_decay")]
    pub decay: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            high_penalty: DEFAULT_HIGH_PENALTY,
            critical_penalty: DEFAULT_CRITICAL_PENALTY,
            decay: DEFAULT_DECAY,
        }
    }
}

impl TrustConfig {
    /// Returns the trust policy.
    const fn policy(&self) -> TrustPolicy {
        TrustPolicy {
            high_penalty: self.high_penalty,
            critical_penalty: self.critical_penalty,
            decay: self.decay,
        }
    }

    /// Validates the policy.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.policy().violation() {
            Some(message) => Err(ConfigError::Invalid(format!("trust: {message}"))),
            None => Ok(()),
        }
    }
}

/// Baseline metric configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaselineConfig {
    /// Polarity for metrics not listed in `metrics`.
    #[serde(default)]
    pub default_polarity: MetricPolarity,
    /// Declared polarity per metric.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricPolarity>,
}

impl BaselineConfig {
    /// Builds the metric registry.
    fn registry(&self) -> MetricRegistry {
        MetricRegistry {
            default_polarity: self.default_polarity,
            metrics: self
                .metrics
                .iter()
                .map(|(metric, polarity)| (MetricName::new(metric.trim()), *polarity))
                .collect(),
        }
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Orchestrator configuration section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorSection {
    /// Functional-check timeout in milliseconds when a request sets none.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Claims cross-check policy.
    #[serde(default)]
    pub claims: ClaimsConfig,
    /// Custom modes keyed by name.
    #[serde(default)]
    pub modes: BTreeMap<String, ModeConfig>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            claims: ClaimsConfig::default(),
            modes: BTreeMap::new(),
        }
    }
}

impl OrchestratorSection {
    /// Builds and validates the orchestrator configuration.
    fn build(&self) -> Result<OrchestratorConfig, ConfigError> {
        if self.default_timeout_ms == 0 || self.default_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "orchestrator.default_timeout_ms must be between 1 and {MAX_TIMEOUT_MS}"
            )));
        }
        if self.modes.len() > MAX_MODES {
            return Err(ConfigError::Invalid(format!(
                "orchestrator.modes exceeds max entries ({MAX_MODES})"
            )));
        }
        let mut modes = BTreeMap::new();
        for (name, mode) in &self.modes {
            modes.insert(name.clone(), mode.stage_set(name)?);
        }
        let config = OrchestratorConfig {
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            claims: self.claims.policy(),
            modes,
            ..OrchestratorConfig::default()
        };
        config.validate().map_err(|err| ConfigError::Invalid(format!("orchestrator: {err}")))?;
        Ok(config)
    }
}

/// Claims policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimsConfig {
    /// Unsupported claims fail the gate.
    #[serde(default)]
    pub blocking: bool,
    /// Metric backing "fixed N errors" claims.
    #[serde(default = "default_error_metric")]
    pub error_metric: String,
    /// Metric backing "coverage N%" claims.
    #[serde(default = "default_coverage_metric")]
    pub coverage_metric: String,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        let policy = ClaimsPolicy::default();
        Self {
            blocking: policy.blocking,
            error_metric: policy.error_metric,
            coverage_metric: policy.coverage_metric,
        }
    }
}

impl ClaimsConfig {
    /// Returns the claims policy.
    fn policy(&self) -> ClaimsPolicy {
        ClaimsPolicy {
            blocking: self.blocking,
            error_metric: self.error_metric.trim().to_string(),
            coverage_metric: self.coverage_metric.trim().to_string(),
        }
    }
}

/// Custom mode definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeConfig {
    /// Enabled stages.
    pub stages: Vec<StageKind>,
}

impl ModeConfig {
    /// Converts the stage list into a stage set.
    fn stage_set(&self, name: &str) -> Result<StageSet, ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "orchestrator.modes.{name} must enable at least one stage"
            )));
        }
        let unique: BTreeSet<StageKind> = self.stages.iter().copied().collect();
        if unique.len() != self.stages.len() {
            return Err(ConfigError::Invalid(format!(
                "orchestrator.modes.{name} lists a stage twice"
            )));
        }
        Ok(StageSet {
            functional: unique.contains(&StageKind::Functional),
            baseline: unique.contains(&StageKind::Baseline),
            claims: unique.contains(&StageKind::Claims),
            security: unique.contains(&StageKind::Security),
            cost: unique.contains(&StageKind::Cost),
        })
    }
}

// ============================================================================
// SECTION: Providers, Audit, Store
// ============================================================================

/// File-backed provider locations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Directory holding `<story>.json|yaml` functional reports.
    #[serde(default)]
    pub reports_dir: Option<PathBuf>,
    /// Directory holding `story-<story>-interactions.json` logs.
    #[serde(default)]
    pub interactions_dir: Option<PathBuf>,
    /// Optional Ed25519 signing key file (raw or base64).
    #[serde(default)]
    pub signing_key: Option<PathBuf>,
    /// Key identifier recorded with signatures.
    #[serde(default)]
    pub signing_key_id: Option<String>,
}

impl ProvidersConfig {
    /// Validates provider paths.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, path) in [
            ("providers.reports_dir", &self.reports_dir),
            ("providers.interactions_dir", &self.interactions_dir),
            ("providers.signing_key", &self.signing_key),
        ] {
            if let Some(path) = path {
                validate_path_string(field, &path.to_string_lossy())?;
            }
        }
        if self.signing_key_id.is_some() && self.signing_key.is_none() {
            return Err(ConfigError::Invalid(
                "providers.signing_key_id requires providers.signing_key".to_string(),
            ));
        }
        if let Some(key_id) = &self.signing_key_id
            && key_id.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "providers.signing_key_id must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Audit sink kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Discard audit events.
    #[default]
    Noop,
    /// JSON lines on stderr.
    Stderr,
    /// Append-only JSON lines file.
    File,
}

/// Audit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// File path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates sink and path pairing.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires audit.path".to_string()))
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory stores.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Persistent store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_path_string("store.path", &path.to_string_lossy())
            }
        }
    }

    /// Returns the `SQLite` configuration with `path` already resolved.
    #[must_use]
    pub fn sqlite_config(&self, path: PathBuf) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Reads a size-limited UTF-8 file.
fn read_limited_utf8(path: &Path, label: &str) -> Result<String, ConfigError> {
    validate_path(path)?;
    let bytes = fs::read(path).map_err(|err| ConfigError::Io(format!("{label}: {err}")))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid(format!("{label} file exceeds size limit")));
    }
    String::from_utf8(bytes)
        .map_err(|_| ConfigError::Invalid(format!("{label} file must be utf-8")))
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Returns true.
const fn default_true() -> bool {
    true
}

/// Returns the default project identifier.
fn default_project_id() -> String {
    "default".to_string()
}

/// Returns the default budget warning fraction.
const fn default_warning_fraction() -> MoneyValue {
    MoneyValue::Number(DEFAULT_WARNING_FRACTION)
}

/// Returns the default budget critical fraction.
const fn default_critical_fraction() -> MoneyValue {
    MoneyValue::Number(DEFAULT_CRITICAL_FRACTION)
}

/// Returns the default HIGH penalty.
const fn default_high_penalty() -> f64 {
    DEFAULT_HIGH_PENALTY
}

/// Returns the default CRITICAL penalty.
const fn default_critical_penalty() -> f64 {
    DEFAULT_CRITICAL_PENALTY
}

/// Returns the default trust decay.
const fn default_decay() -> f64 {
    DEFAULT_DECAY
}

/// Returns the default functional timeout in milliseconds.
fn default_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_FUNCTIONAL_TIMEOUT.as_millis()).unwrap_or(MAX_TIMEOUT_MS)
}

/// Returns the default claims error metric.
fn default_error_metric() -> String {
    ClaimsPolicy::default().error_metric
}

/// Returns the default claims coverage metric.
fn default_coverage_metric() -> String {
    ClaimsPolicy::default().coverage_metric
}

/// Returns the default busy timeout for the store.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}
