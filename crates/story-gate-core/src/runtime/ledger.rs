// crates/story-gate-core/src/runtime/ledger.rs
// ============================================================================
// Module: Story Gate Cost Ledger
// Description: Prices token usage and aggregates spend over periods.
// Purpose: Maintain an append-only cost ledger with exact decimal arithmetic.
// Dependencies: crate::core, crate::interfaces, bigdecimal, thiserror, tracing
// ============================================================================

//! ## Overview
//! The ledger prices each [`CostEvent`] against the pricing snapshot taken at
//! record time and appends it through a [`CostLedgerStore`]. Aggregations are
//! pure functions of the stored entries and an explicit `now`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use thiserror::Error;
use tracing::debug;

use crate::core::CostAggregate;
use crate::core::CostEvent;
use crate::core::CostFilter;
use crate::core::LedgerEntry;
use crate::core::ModelEfficiency;
use crate::core::ModelId;
use crate::core::Money;
use crate::core::Period;
use crate::core::PeriodError;
use crate::core::PricingTable;
use crate::core::RoiReport;
use crate::core::RoiValueModel;
use crate::core::StoryId;
use crate::core::Timestamp;
use crate::interfaces::CostLedgerStore;
use crate::interfaces::LedgerAppendError;
use crate::interfaces::StoreError;
use crate::runtime::audit::AuditEvent;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::snapshot::SnapshotCell;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Cost ledger errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The event's model has no pricing entry.
    #[error("no pricing for model {0}")]
    UnknownModel(ModelId),
    /// The event timestamp precedes the latest recorded entry.
    #[error("event at {attempted} precedes latest ledger entry at {latest}")]
    NonMonotonicTimestamp {
        /// Latest recorded timestamp.
        latest: Timestamp,
        /// Rejected timestamp.
        attempted: Timestamp,
    },
    /// Period could not be resolved.
    #[error(transparent)]
    Period(#[from] PeriodError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LedgerAppendError> for LedgerError {
    fn from(error: LedgerAppendError) -> Self {
        match error {
            LedgerAppendError::OutOfOrder {
                latest,
                attempted,
            } => Self::NonMonotonicTimestamp {
                latest,
                attempted,
            },
            LedgerAppendError::Store(err) => Self::Store(err),
        }
    }
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Append-only cost ledger.
pub struct CostLedger<C> {
    /// Ledger persistence.
    store: C,
    /// Current pricing snapshot.
    pricing: SnapshotCell<PricingTable>,
    /// Value estimator for stories without an explicit value.
    value_model: RoiValueModel,
    /// Audit sink for recorded events.
    audit: Arc<dyn AuditSink>,
}

impl<C: CostLedgerStore> CostLedger<C> {
    /// Creates a ledger with the default value model.
    #[must_use]
    pub fn new(store: C, pricing: PricingTable) -> Self {
        Self {
            store,
            pricing: SnapshotCell::new(pricing),
            value_model: RoiValueModel::default(),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Replaces the value model.
    #[must_use]
    pub fn with_value_model(mut self, value_model: RoiValueModel) -> Self {
        self.value_model = value_model;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the current pricing snapshot.
    #[must_use]
    pub fn pricing(&self) -> Arc<PricingTable> {
        self.pricing.load()
    }

    /// Swaps in a new pricing table. Already-recorded costs are not repriced.
    pub fn reload_pricing(&self, pricing: PricingTable) {
        self.pricing.swap(pricing);
        self.audit.record(&AuditEvent::ConfigReloaded {
            component: "pricing".to_string(),
            digest: None,
        });
    }

    /// Prices and appends an event.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownModel`] for unpriced models and
    /// [`LedgerError::NonMonotonicTimestamp`] for out-of-order events.
    pub fn record(&self, event: CostEvent) -> Result<LedgerEntry, LedgerError> {
        let pricing = self.pricing.load();
        let rates = pricing
            .get(&event.model_id)
            .ok_or_else(|| LedgerError::UnknownModel(event.model_id.clone()))?;
        let cost = rates.cost(event.input_tokens, event.output_tokens);
        let entry = self.store.append(event, cost)?;
        debug!(
            sequence = entry.sequence,
            agent = %entry.event.agent_id,
            model = %entry.event.model_id,
            cost = %entry.cost,
            "recorded cost event"
        );
        self.audit.record(&AuditEvent::CostRecorded {
            sequence: entry.sequence,
            agent_id: entry.event.agent_id.clone(),
            model_id: entry.event.model_id.clone(),
            cost: entry.cost.clone(),
        });
        Ok(entry)
    }

    /// Aggregates spend over a period.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the period is invalid or the store fails.
    pub fn aggregate(
        &self,
        period: Period,
        now: Timestamp,
        filter: &CostFilter,
    ) -> Result<CostAggregate, LedgerError> {
        let window = period.resolve(now)?;
        let entries = self.store.entries(&window)?;
        Ok(CostAggregate::from_entries(
            window,
            entries.iter().filter(|entry| filter.matches(entry)),
        ))
    }

    /// Returns the total spend attributed to a story.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the store fails.
    pub fn story_cost(&self, story_id: &StoryId, now: Timestamp) -> Result<CostAggregate, LedgerError> {
        self.aggregate(Period::AllTime, now, &CostFilter::story(story_id.clone()))
    }

    /// Estimates the value of work from its cost with the configured model.
    #[must_use]
    pub fn estimate_value(&self, cost: &Money) -> Money {
        self.value_model.estimate_value(cost)
    }

    /// Computes ROI for a story; `value` defaults to the estimator.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the store fails.
    pub fn roi(
        &self,
        story_id: &StoryId,
        value: Option<Money>,
        now: Timestamp,
    ) -> Result<RoiReport, LedgerError> {
        let cost = self.story_cost(story_id, now)?.total_cost;
        let value = value.unwrap_or_else(|| self.estimate_value(&cost));
        Ok(RoiReport::compute(story_id.clone(), cost, value))
    }

    /// Reports per-model spend efficiency over a period, ordered by model id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the period is invalid or the store fails.
    pub fn model_efficiency(
        &self,
        period: Period,
        now: Timestamp,
    ) -> Result<Vec<ModelEfficiency>, LedgerError> {
        let window = period.resolve(now)?;
        let entries = self.store.entries(&window)?;
        let mut grouped: BTreeMap<ModelId, Vec<&LedgerEntry>> = BTreeMap::new();
        for entry in &entries {
            grouped.entry(entry.event.model_id.clone()).or_default().push(entry);
        }
        Ok(grouped
            .into_iter()
            .map(|(model_id, entries)| efficiency(model_id, &entries))
            .collect())
    }
}

/// Builds the efficiency row for one model's entries.
fn efficiency(model_id: ModelId, entries: &[&LedgerEntry]) -> ModelEfficiency {
    let mut total_cost = Money::zero();
    let mut total_tokens = 0_u64;
    for entry in entries {
        total_cost = total_cost + &entry.cost;
        total_tokens = total_tokens
            .saturating_add(entry.event.input_tokens)
            .saturating_add(entry.event.output_tokens);
    }
    let event_count = u64::try_from(entries.len()).unwrap_or(u64::MAX);
    let count = BigDecimal::from(event_count.max(1));
    let cost_per_event = Money::new(total_cost.as_decimal() / &count);
    let cost_per_1k_tokens = (total_tokens > 0).then(|| {
        Money::new(
            total_cost.as_decimal() * BigDecimal::from(1000) / BigDecimal::from(total_tokens),
        )
    });
    ModelEfficiency {
        model_id,
        total_cost,
        event_count,
        total_tokens,
        cost_per_event,
        tokens_per_event: total_tokens / event_count.max(1),
        cost_per_1k_tokens,
    }
}
