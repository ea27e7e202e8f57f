// crates/story-gate-core/src/runtime/baseline.rs
// ============================================================================
// Module: Story Gate Regression Gate
// Description: Compares measured debt metrics against stored baselines.
// Purpose: Block stories that make tracked metrics worse than accepted values.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! The regression gate reads baselines through a [`BaselineStore`]. The first
//! measurement for a key seeds the baseline atomically. Baselines only ever
//! move through [`RegressionGate::accept_baseline`], which appends to the
//! history; nothing is overwritten.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tracing::info;

use crate::core::Baseline;
use crate::core::BaselineCheck;
use crate::core::BaselineEntry;
use crate::core::BaselineOrigin;
use crate::core::BaselineStatus;
use crate::core::MetricName;
use crate::core::MetricRegistry;
use crate::core::ProjectId;
use crate::core::Timestamp;
use crate::interfaces::BaselineStore;
use crate::interfaces::SeedOutcome;
use crate::interfaces::StoreError;
use crate::runtime::audit::AuditEvent;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::snapshot::SnapshotCell;

// ============================================================================
// SECTION: Regression Gate
// ============================================================================

/// Baseline comparison gate over a pluggable store.
pub struct RegressionGate<B> {
    /// Baseline persistence.
    store: B,
    /// Metric polarity registry.
    registry: SnapshotCell<MetricRegistry>,
    /// Audit sink for acceptances.
    audit: Arc<dyn AuditSink>,
}

impl<B: BaselineStore> RegressionGate<B> {
    /// Creates a gate with a no-op audit sink.
    #[must_use]
    pub fn new(store: B, registry: MetricRegistry) -> Self {
        Self {
            store,
            registry: SnapshotCell::new(registry),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &B {
        &self.store
    }

    /// Returns the current registry snapshot.
    #[must_use]
    pub fn registry(&self) -> Arc<MetricRegistry> {
        self.registry.load()
    }

    /// Swaps in a new metric registry.
    pub fn reload_registry(&self, registry: MetricRegistry) {
        self.registry.swap(registry);
        self.audit.record(&AuditEvent::ConfigReloaded {
            component: "metrics".to_string(),
            digest: None,
        });
    }

    /// Returns the baseline with its full history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn get_baseline(
        &self,
        project_id: &ProjectId,
        metric: &MetricName,
    ) -> Result<Option<Baseline>, StoreError> {
        self.store.get(project_id, metric)
    }

    /// Lists every baseline for a project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn list_baselines(&self, project_id: &ProjectId) -> Result<Vec<Baseline>, StoreError> {
        self.store.list(project_id)
    }

    /// Checks a measurement, seeding the baseline if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    pub fn check(
        &self,
        project_id: &ProjectId,
        metric: &MetricName,
        measured: f64,
        at: Timestamp,
    ) -> Result<BaselineCheck, StoreError> {
        let polarity = self.registry.load().polarity(metric);
        let seed = BaselineEntry {
            value: measured,
            recorded_at: at,
            note: None,
            origin: BaselineOrigin::Seed,
        };
        match self.store.seed_if_absent(project_id, metric, seed)? {
            SeedOutcome::Seeded(_) => {
                info!(project = %project_id, metric = %metric, value = measured, "seeded baseline");
                Ok(BaselineCheck {
                    project_id: project_id.clone(),
                    metric: metric.clone(),
                    polarity,
                    status: BaselineStatus::Seeded,
                    baseline: measured,
                    measured,
                    delta: 0.0,
                })
            }
            SeedOutcome::Existing(baseline) => {
                let current = baseline.value().ok_or_else(|| {
                    StoreError::Corrupt(format!("baseline {project_id}/{metric} has no history"))
                })?;
                Ok(BaselineCheck::compare(
                    project_id.clone(),
                    metric.clone(),
                    polarity,
                    current,
                    measured,
                ))
            }
        }
    }

    /// Accepts a new baseline value, appending it to the history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a non-finite value, or the store's error.
    pub fn accept_baseline(
        &self,
        project_id: &ProjectId,
        metric: &MetricName,
        value: f64,
        note: Option<String>,
        at: Timestamp,
    ) -> Result<Baseline, StoreError> {
        if !value.is_finite() {
            return Err(StoreError::Invalid(format!("baseline {metric} must be finite")));
        }
        let previous = self.store.get(project_id, metric)?.and_then(|baseline| baseline.value());
        let entry = BaselineEntry {
            value,
            recorded_at: at,
            note: note.clone(),
            origin: BaselineOrigin::Accepted,
        };
        let baseline = self.store.append(project_id, metric, entry)?;
        self.audit.record(&AuditEvent::BaselineAccepted {
            project_id: project_id.clone(),
            metric: metric.clone(),
            value,
            previous,
            note,
        });
        Ok(baseline)
    }
}
