// crates/story-gate-core/src/core/cost.rs
// ============================================================================
// Module: Story Gate Cost Model
// Description: Money, pricing, cost events, aggregation windows, budgets, and ROI.
// Purpose: Provide exact-decimal cost accounting types shared by ledger stores.
// Dependencies: bigdecimal, serde, time
// ============================================================================

//! ## Overview
//! All money arithmetic uses [`BigDecimal`] so that aggregate totals equal the
//! sum of per-event costs exactly. Money serializes as a decimal string so
//! canonical hashes never depend on float formatting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use bigdecimal::Zero;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;
use time::Duration as CalendarDuration;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::ModelId;
use crate::core::identifiers::StoryId;
use crate::core::time::MILLIS_PER_DAY;
use crate::core::time::MILLIS_PER_HOUR;
use crate::core::time::TimeWindow;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Money
// ============================================================================

/// Exact decimal money amount.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(BigDecimal);

impl Money {
    /// Returns zero.
    #[must_use]
    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    /// Wraps a decimal value.
    #[must_use]
    pub const fn new(value: BigDecimal) -> Self {
        Self(value)
    }

    /// Returns the decimal value.
    #[must_use]
    pub const fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    /// Returns true when the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parses a decimal string.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidAmount`] when the input is not a decimal.
    pub fn parse(value: &str) -> Result<Self, PricingError> {
        BigDecimal::from_str(value.trim())
            .map(Self)
            .map_err(|_| PricingError::InvalidAmount(value.to_string()))
    }

    /// Converts a float through its shortest decimal rendering.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidAmount`] for non-finite values.
    pub fn from_f64(value: f64) -> Result<Self, PricingError> {
        if !value.is_finite() {
            return Err(PricingError::InvalidAmount(value.to_string()));
        }
        Self::parse(&value.to_string())
    }

    /// Multiplies the amount by a token count scaled per thousand tokens.
    #[must_use]
    pub fn per_thousand(&self, tokens: u64) -> Self {
        let thousandth = BigDecimal::new(1.into(), 3);
        Self(&self.0 * BigDecimal::from(tokens) * thousandth)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Money> for Money {
    type Output = Self;

    fn add(self, rhs: &'a Money) -> Self::Output {
        Self(self.0 + &rhs.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalized())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pricing and money configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// Amount could not be parsed.
    #[error("invalid decimal amount: {0}")]
    InvalidAmount(String),
    /// Pricing table is invalid.
    #[error("invalid pricing table: {0}")]
    Invalid(String),
}

/// Budget configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BudgetError {
    /// Budget definition is invalid.
    #[error("invalid budget: {0}")]
    Invalid(String),
}

/// Period resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeriodError {
    /// The reference timestamp is outside the supported calendar range.
    #[error("timestamp outside calendar range: {0}")]
    OutOfRange(Timestamp),
    /// An explicit window has `start > end`.
    #[error("invalid window: start after end")]
    InvalidWindow,
}

// ============================================================================
// SECTION: Pricing
// ============================================================================

/// Per-model token rates (per 1,000 tokens).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Rate charged per 1,000 input tokens.
    pub input_per_1k: Money,
    /// Rate charged per 1,000 output tokens.
    pub output_per_1k: Money,
}

impl ModelPricing {
    /// Computes the cost of a token pair.
    #[must_use]
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Money {
        self.input_per_1k.per_thousand(input_tokens) + self.output_per_1k.per_thousand(output_tokens)
    }
}

/// Immutable model pricing table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PricingTable {
    /// Pricing keyed by model identifier.
    models: BTreeMap<ModelId, ModelPricing>,
}

impl PricingTable {
    /// Builds a pricing table, rejecting negative rates.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Invalid`] when a rate is negative or a model id is empty.
    pub fn new(models: BTreeMap<ModelId, ModelPricing>) -> Result<Self, PricingError> {
        for (model, pricing) in &models {
            if model.as_str().trim().is_empty() {
                return Err(PricingError::Invalid("model id must be non-empty".to_string()));
            }
            if pricing.input_per_1k < Money::zero() || pricing.output_per_1k < Money::zero() {
                return Err(PricingError::Invalid(format!("model {model} has a negative rate")));
            }
        }
        Ok(Self {
            models,
        })
    }

    /// Returns pricing for a model.
    #[must_use]
    pub fn get(&self, model: &ModelId) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    /// Returns the number of priced models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true when no models are priced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Usage event submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEvent {
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Agent the spend is attributed to.
    pub agent_id: AgentId,
    /// Model that was called.
    pub model_id: ModelId,
    /// Input token count.
    pub input_tokens: u64,
    /// Output token count.
    pub output_tokens: u64,
    /// Story the spend is attributed to.
    #[serde(default)]
    pub story_id: Option<StoryId>,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

/// Immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 1-based append sequence.
    pub sequence: u64,
    /// Recorded event.
    pub event: CostEvent,
    /// Cost computed at record time.
    pub cost: Money,
}

/// Optional aggregation filter; absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostFilter {
    /// Restrict to an agent.
    pub agent_id: Option<AgentId>,
    /// Restrict to a model.
    pub model_id: Option<ModelId>,
    /// Restrict to a story.
    pub story_id: Option<StoryId>,
}

impl CostFilter {
    /// Returns a filter for a single story.
    #[must_use]
    pub fn story(story_id: StoryId) -> Self {
        Self {
            story_id: Some(story_id),
            ..Self::default()
        }
    }

    /// Returns true when the entry passes the filter.
    #[must_use]
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.agent_id.as_ref().is_none_or(|agent| *agent == entry.event.agent_id)
            && self.model_id.as_ref().is_none_or(|model| *model == entry.event.model_id)
            && self
                .story_id
                .as_ref()
                .is_none_or(|story| entry.event.story_id.as_ref() == Some(story))
    }
}

// ============================================================================
// SECTION: Periods
// ============================================================================

/// Aggregation period resolved against an explicit `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Period {
    /// Trailing `hours` ending at `now`.
    TrailingHours {
        /// Window length in hours.
        hours: u32,
    },
    /// Trailing `days` ending at `now`.
    TrailingDays {
        /// Window length in days.
        days: u32,
    },
    /// UTC calendar day containing `now`.
    CalendarDay,
    /// UTC calendar week (Monday start) containing `now`.
    CalendarWeek,
    /// UTC calendar month containing `now`.
    CalendarMonth,
    /// Every recorded event.
    AllTime,
    /// Explicit closed window.
    Window {
        /// Window bounds.
        window: TimeWindow,
    },
}

impl Period {
    /// Resolves the period into a closed window.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError`] when `now` is outside the calendar range or an
    /// explicit window is inverted.
    pub fn resolve(self, now: Timestamp) -> Result<TimeWindow, PeriodError> {
        let trailing = |span: i64| TimeWindow {
            start: now.saturating_sub_millis(span),
            end: now,
        };
        match self {
            Self::TrailingHours {
                hours,
            } => Ok(trailing(i64::from(hours) * MILLIS_PER_HOUR)),
            Self::TrailingDays {
                days,
            } => Ok(trailing(i64::from(days) * MILLIS_PER_DAY)),
            Self::CalendarDay => {
                let date = now.date().ok_or(PeriodError::OutOfRange(now))?;
                Ok(TimeWindow {
                    start: Timestamp::start_of_date(date),
                    end: now,
                })
            }
            Self::CalendarWeek => {
                let date = now.date().ok_or(PeriodError::OutOfRange(now))?;
                let offset = i64::from(date.weekday().number_days_from_monday());
                let monday = date
                    .checked_sub(CalendarDuration::days(offset))
                    .ok_or(PeriodError::OutOfRange(now))?;
                Ok(TimeWindow {
                    start: Timestamp::start_of_date(monday),
                    end: now,
                })
            }
            Self::CalendarMonth => {
                let date = now.date().ok_or(PeriodError::OutOfRange(now))?;
                let first = date.replace_day(1).map_err(|_| PeriodError::OutOfRange(now))?;
                Ok(TimeWindow {
                    start: Timestamp::start_of_date(first),
                    end: now,
                })
            }
            Self::AllTime => Ok(TimeWindow {
                start: TimeWindow::unbounded().start,
                end: now,
            }),
            Self::Window {
                window,
            } => TimeWindow::new(window.start, window.end).ok_or(PeriodError::InvalidWindow),
        }
    }
}

// ============================================================================
// SECTION: Aggregates
// ============================================================================

/// Aggregated spend over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostAggregate {
    /// Window aggregated over.
    pub window: TimeWindow,
    /// Total cost.
    pub total_cost: Money,
    /// Number of events.
    pub event_count: u64,
    /// Total input tokens.
    pub input_tokens: u64,
    /// Total output tokens.
    pub output_tokens: u64,
    /// Spend per agent.
    pub by_agent: BTreeMap<AgentId, Money>,
    /// Spend per model.
    pub by_model: BTreeMap<ModelId, Money>,
    /// Spend per story (unattributed spend is omitted).
    pub by_story: BTreeMap<StoryId, Money>,
    /// Spend per UTC day key (`YYYY-MM-DD`).
    pub by_day: BTreeMap<String, Money>,
}

impl CostAggregate {
    /// Builds an aggregate from matching ledger entries.
    #[must_use]
    pub fn from_entries<'a>(
        window: TimeWindow,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Self {
        let mut aggregate = Self {
            window,
            total_cost: Money::zero(),
            event_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            by_agent: BTreeMap::new(),
            by_model: BTreeMap::new(),
            by_story: BTreeMap::new(),
            by_day: BTreeMap::new(),
        };
        for entry in entries {
            aggregate.absorb(entry);
        }
        aggregate
    }

    /// Adds a single entry to the aggregate.
    fn absorb(&mut self, entry: &LedgerEntry) {
        let cost = &entry.cost;
        self.total_cost = std::mem::take(&mut self.total_cost) + cost;
        self.event_count = self.event_count.saturating_add(1);
        self.input_tokens = self.input_tokens.saturating_add(entry.event.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(entry.event.output_tokens);
        accumulate(&mut self.by_agent, entry.event.agent_id.clone(), cost);
        accumulate(&mut self.by_model, entry.event.model_id.clone(), cost);
        if let Some(story) = &entry.event.story_id {
            accumulate(&mut self.by_story, story.clone(), cost);
        }
        accumulate(&mut self.by_day, entry.event.timestamp.day_key(), cost);
    }

    /// Returns the mean cost per event, or `None` for an empty aggregate.
    #[must_use]
    pub fn average_cost(&self) -> Option<Money> {
        if self.event_count == 0 {
            return None;
        }
        Some(Money(self.total_cost.as_decimal() / &BigDecimal::from(self.event_count)))
    }
}

/// Adds `cost` to the bucket for `key`.
fn accumulate<K: Ord>(map: &mut BTreeMap<K, Money>, key: K, cost: &Money) {
    let slot = map.entry(key).or_default();
    *slot = std::mem::take(slot) + cost;
}

/// Spend efficiency for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEfficiency {
    /// Model identifier.
    pub model_id: ModelId,
    /// Total spend.
    pub total_cost: Money,
    /// Number of events.
    pub event_count: u64,
    /// Total tokens (input + output).
    pub total_tokens: u64,
    /// Mean cost per event.
    pub cost_per_event: Money,
    /// Mean tokens per event.
    pub tokens_per_event: u64,
    /// Cost per 1,000 tokens, absent when no tokens were used.
    pub cost_per_1k_tokens: Option<Money>,
}

// ============================================================================
// SECTION: Budgets
// ============================================================================

/// Budget period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    /// UTC calendar day.
    Daily,
    /// UTC calendar week (Monday start).
    Weekly,
    /// UTC calendar month.
    Monthly,
    /// Every recorded event.
    ProjectTotal,
}

impl BudgetPeriod {
    /// Returns the aggregation period for the budget.
    #[must_use]
    pub const fn period(self) -> Period {
        match self {
            Self::Daily => Period::CalendarDay,
            Self::Weekly => Period::CalendarWeek,
            Self::Monthly => Period::CalendarMonth,
            Self::ProjectTotal => Period::AllTime,
        }
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::ProjectTotal => "project_total",
        };
        f.write_str(label)
    }
}

/// Budget with tiered alert thresholds expressed as fractions of the ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Budget period.
    pub period: BudgetPeriod,
    /// Spending ceiling.
    pub ceiling: Money,
    /// Fraction of the ceiling raising a WARNING.
    pub warning_fraction: Money,
    /// Fraction of the ceiling raising a CRITICAL alert.
    pub critical_fraction: Money,
}

impl Budget {
    /// Validates `ceiling > 0` and `0 < warning <= critical`.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::Invalid`] when the budget is malformed.
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.ceiling <= Money::zero() {
            return Err(BudgetError::Invalid(format!("{} ceiling must be positive", self.period)));
        }
        if self.warning_fraction <= Money::zero() {
            return Err(BudgetError::Invalid(format!(
                "{} warning fraction must be positive",
                self.period
            )));
        }
        if self.warning_fraction > self.critical_fraction {
            return Err(BudgetError::Invalid(format!(
                "{} warning fraction must not exceed critical fraction",
                self.period
            )));
        }
        Ok(())
    }

    /// Returns the fraction of the ceiling used by `spent`.
    #[must_use]
    pub fn fraction_used(&self, spent: &Money) -> Money {
        Money(spent.as_decimal() / self.ceiling.as_decimal())
    }

    /// Returns the tier for a used fraction.
    #[must_use]
    pub fn tier_for(&self, fraction_used: &Money) -> BudgetTier {
        if *fraction_used >= self.critical_fraction {
            BudgetTier::Critical
        } else if *fraction_used >= self.warning_fraction {
            BudgetTier::Warning
        } else {
            BudgetTier::None
        }
    }
}

/// Budget alert tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetTier {
    /// Below the warning threshold.
    None,
    /// At or above the warning threshold.
    Warning,
    /// At or above the critical threshold.
    Critical,
}

/// Result of checking a budget against the current aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Budget period.
    pub period: BudgetPeriod,
    /// Window the spend was aggregated over.
    pub window: TimeWindow,
    /// Spending ceiling.
    pub ceiling: Money,
    /// Spend in the window.
    pub spent: Money,
    /// `spent / ceiling`.
    pub fraction_used: Money,
    /// Alert tier.
    pub tier: BudgetTier,
}

// ============================================================================
// SECTION: ROI
// ============================================================================

/// ROI percentage; undefined when the attributed cost is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RoiPercent {
    /// `(value - cost) / cost * 100`.
    Defined(Money),
    /// Cost was zero.
    Undefined,
}

/// ROI report for a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiReport {
    /// Story identifier.
    pub story_id: StoryId,
    /// Attributed cost.
    pub cost: Money,
    /// Estimated value of the completed work.
    pub value: Money,
    /// ROI percentage.
    pub roi_percent: RoiPercent,
}

impl RoiReport {
    /// Computes the ROI for a cost/value pair.
    #[must_use]
    pub fn compute(story_id: StoryId, cost: Money, value: Money) -> Self {
        let roi_percent = if cost.is_zero() {
            RoiPercent::Undefined
        } else {
            let gain = value.as_decimal() - cost.as_decimal();
            RoiPercent::Defined(Money(gain / cost.as_decimal() * BigDecimal::from(100)))
        };
        Self {
            story_id,
            cost,
            value,
            roi_percent,
        }
    }

    /// Returns true when the ROI is defined and negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        matches!(&self.roi_percent, RoiPercent::Defined(percent) if *percent < Money::zero())
    }
}

/// Hours-saved value estimator for stories without an explicit value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiValueModel {
    /// Value of one saved hour.
    pub hourly_rate: Money,
    /// Hours saved per unit of spend.
    pub hours_per_cost_unit: Money,
    /// Cap on hours saved per story.
    pub max_hours: Money,
}

impl Default for RoiValueModel {
    fn default() -> Self {
        Self {
            hourly_rate: Money(BigDecimal::from(50)),
            hours_per_cost_unit: Money(BigDecimal::from(10)),
            max_hours: Money(BigDecimal::from(8)),
        }
    }
}

impl RoiValueModel {
    /// Estimates the value of work that cost `cost`.
    #[must_use]
    pub fn estimate_value(&self, cost: &Money) -> Money {
        let hours = Money(cost.as_decimal() * self.hours_per_cost_unit.as_decimal());
        let hours = if hours > self.max_hours { self.max_hours.clone() } else { hours };
        Money(hours.as_decimal() * self.hourly_rate.as_decimal())
    }
}
