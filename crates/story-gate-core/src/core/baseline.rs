// crates/story-gate-core/src/core/baseline.rs
// ============================================================================
// Module: Story Gate Baselines
// Description: Baseline history records, metric polarity, and regression checks.
// Purpose: Provide the data model behind the regression gate.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Baseline`] is keyed by `(project, metric)` and carries its full
//! history; the current value is always the last entry. Polarity is declared
//! per metric in a [`MetricRegistry`] and never inferred from values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::MetricName;
use crate::core::identifiers::ProjectId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Polarity
// ============================================================================

/// Declared direction of improvement for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricPolarity {
    /// Smaller values are better (error counts).
    #[default]
    LowerIsBetter,
    /// Larger values are better (coverage percentage).
    HigherIsBetter,
}

impl MetricPolarity {
    /// Returns true when `measured` is worse than `baseline`.
    ///
    /// Equal values never regress.
    #[must_use]
    pub fn is_regression(self, baseline: f64, measured: f64) -> bool {
        match self {
            Self::LowerIsBetter => measured > baseline,
            Self::HigherIsBetter => measured < baseline,
        }
    }
}

/// Declared metric polarities with a fallback for undeclared metrics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricRegistry {
    /// Polarity applied to undeclared metrics.
    #[serde(default)]
    pub default_polarity: MetricPolarity,
    /// Declared polarities.
    #[serde(default)]
    pub metrics: BTreeMap<MetricName, MetricPolarity>,
}

impl MetricRegistry {
    /// Declares a metric polarity.
    #[must_use]
    pub fn with_metric(mut self, metric: impl Into<MetricName>, polarity: MetricPolarity) -> Self {
        self.metrics.insert(metric.into(), polarity);
        self
    }

    /// Returns the polarity for a metric.
    #[must_use]
    pub fn polarity(&self, metric: &MetricName) -> MetricPolarity {
        self.metrics.get(metric).copied().unwrap_or(self.default_polarity)
    }
}

// ============================================================================
// SECTION: History
// ============================================================================

/// How a history entry came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineOrigin {
    /// First measurement seeded automatically.
    Seed,
    /// Explicit operator acceptance.
    Accepted,
}

impl BaselineOrigin {
    /// Returns the storage label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Accepted => "accepted",
        }
    }

    /// Parses a storage label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "seed" => Some(Self::Seed),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// Single baseline history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    /// Baseline value.
    pub value: f64,
    /// When the value was recorded.
    pub recorded_at: Timestamp,
    /// Operator note.
    pub note: Option<String>,
    /// Entry origin.
    pub origin: BaselineOrigin,
}

/// Baseline for a `(project, metric)` key with full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Project identifier.
    pub project_id: ProjectId,
    /// Metric name.
    pub metric: MetricName,
    /// History in append order; never empty for a stored baseline.
    pub history: Vec<BaselineEntry>,
}

impl Baseline {
    /// Returns the current entry (the last one appended).
    #[must_use]
    pub fn current(&self) -> Option<&BaselineEntry> {
        self.history.last()
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        self.current().map(|entry| entry.value)
    }
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Regression gate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaselineStatus {
    /// Not worse than the baseline.
    Ok,
    /// Worse than the baseline.
    Regression,
    /// No prior baseline; the measurement became the seed.
    Seeded,
}

/// Result of checking a measurement against a baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineCheck {
    /// Project identifier.
    pub project_id: ProjectId,
    /// Metric name.
    pub metric: MetricName,
    /// Polarity used for the comparison.
    pub polarity: MetricPolarity,
    /// Gate status.
    pub status: BaselineStatus,
    /// Baseline value compared against.
    pub baseline: f64,
    /// Measured value.
    pub measured: f64,
    /// `measured - baseline`.
    pub delta: f64,
}

impl BaselineCheck {
    /// Compares a measurement against an existing baseline value.
    #[must_use]
    pub fn compare(
        project_id: ProjectId,
        metric: MetricName,
        polarity: MetricPolarity,
        baseline: f64,
        measured: f64,
    ) -> Self {
        let status = if polarity.is_regression(baseline, measured) {
            BaselineStatus::Regression
        } else {
            BaselineStatus::Ok
        };
        Self {
            project_id,
            metric,
            polarity,
            status,
            baseline,
            measured,
            delta: measured - baseline,
        }
    }

    /// Returns true when the status is a regression.
    #[must_use]
    pub fn is_regression(&self) -> bool {
        self.status == BaselineStatus::Regression
    }
}
