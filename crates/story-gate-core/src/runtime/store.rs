// crates/story-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Story Gate In-Memory Stores
// Description: Simple in-memory implementations of the store interfaces.
// Purpose: Provide deterministic stores for tests and ephemeral deployments.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! In-memory stores keep their state behind a mutex. Clones
//! share the same underlying state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::Baseline;
use crate::core::BaselineEntry;
use crate::core::CostEvent;
use crate::core::LedgerEntry;
use crate::core::MetricName;
use crate::core::Money;
use crate::core::ProjectId;
use crate::core::StoryId;
use crate::core::TimeWindow;
use crate::core::ValidationRun;
use crate::interfaces::BaselineStore;
use crate::interfaces::CostLedgerStore;
use crate::interfaces::LedgerAppendError;
use crate::interfaces::RunHistoryStore;
use crate::interfaces::SeedOutcome;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Baselines
// ============================================================================

/// Baseline history keyed by `(project, metric)`.
type BaselineTable = BTreeMap<(ProjectId, MetricName), Vec<BaselineEntry>>;

/// In-memory baseline store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBaselineStore {
    /// Baseline histories protected by a mutex.
    baselines: Arc<Mutex<BaselineTable>>,
}

impl InMemoryBaselineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Builds a baseline view of a stored history.
fn baseline_view(project: &ProjectId, metric: &MetricName, history: &[BaselineEntry]) -> Baseline {
    Baseline {
        project_id: project.clone(),
        metric: metric.clone(),
        history: history.to_vec(),
    }
}

impl BaselineStore for InMemoryBaselineStore {
    fn get(
        &self,
        project: &ProjectId,
        metric: &MetricName,
    ) -> Result<Option<Baseline>, StoreError> {
        let guard = self
            .baselines
            .lock()
            .map_err(|_| StoreError::Store("baseline store mutex poisoned".to_string()))?;
        Ok(guard
            .get(&(project.clone(), metric.clone()))
            .map(|history| baseline_view(project, metric, history)))
    }

    fn append(
        &self,
        project: &ProjectId,
        metric: &MetricName,
        entry: BaselineEntry,
    ) -> Result<Baseline, StoreError> {
        let mut guard = self
            .baselines
            .lock()
            .map_err(|_| StoreError::Store("baseline store mutex poisoned".to_string()))?;
        let history = guard.entry((project.clone(), metric.clone())).or_default();
        history.push(entry);
        Ok(baseline_view(project, metric, history))
    }

    fn seed_if_absent(
        &self,
        project: &ProjectId,
        metric: &MetricName,
        entry: BaselineEntry,
    ) -> Result<SeedOutcome, StoreError> {
        let mut guard = self
            .baselines
            .lock()
            .map_err(|_| StoreError::Store("baseline store mutex poisoned".to_string()))?;
        let history = guard.entry((project.clone(), metric.clone())).or_default();
        if history.is_empty() {
            history.push(entry);
            Ok(SeedOutcome::Seeded(baseline_view(project, metric, history)))
        } else {
            Ok(SeedOutcome::Existing(baseline_view(project, metric, history)))
        }
    }

    fn list(&self, project: &ProjectId) -> Result<Vec<Baseline>, StoreError> {
        let guard = self
            .baselines
            .lock()
            .map_err(|_| StoreError::Store("baseline store mutex poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|((owner, _), _)| owner == project)
            .map(|((owner, metric), history)| baseline_view(owner, metric, history))
            .collect())
    }
}

// ============================================================================
// SECTION: Cost Ledger
// ============================================================================

/// In-memory append-only cost ledger.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCostLedgerStore {
    /// Entries in sequence order.
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl InMemoryCostLedgerStore {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CostLedgerStore for InMemoryCostLedgerStore {
    fn append(&self, event: CostEvent, cost: Money) -> Result<LedgerEntry, LedgerAppendError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StoreError::Store("cost ledger mutex poisoned".to_string()))?;
        if let Some(latest) = guard.last()
            && event.timestamp < latest.event.timestamp
        {
            return Err(LedgerAppendError::OutOfOrder {
                latest: latest.event.timestamp,
                attempted: event.timestamp,
            });
        }
        let sequence = guard.last().map_or(1, |latest| latest.sequence + 1);
        let entry = LedgerEntry {
            sequence,
            event,
            cost,
        };
        guard.push(entry.clone());
        Ok(entry)
    }

    fn entries(&self, window: &TimeWindow) -> Result<Vec<LedgerEntry>, StoreError> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| StoreError::Store("cost ledger mutex poisoned".to_string()))?;
        Ok(guard.iter().filter(|entry| window.contains(entry.event.timestamp)).cloned().collect())
    }
}

// ============================================================================
// SECTION: Run History
// ============================================================================

/// In-memory validation run history.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRunHistoryStore {
    /// Runs in append order.
    runs: Arc<Mutex<Vec<ValidationRun>>>,
}

impl InMemoryRunHistoryStore {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the run list.
    fn lock(&self) -> Result<MutexGuard<'_, Vec<ValidationRun>>, StoreError> {
        self.runs.lock().map_err(|_| StoreError::Store("run history mutex poisoned".to_string()))
    }
}

impl RunHistoryStore for InMemoryRunHistoryStore {
    fn append_run(&self, run: &ValidationRun) -> Result<(), StoreError> {
        let mut runs = self.lock()?;
        let latest = runs.iter().rev().find(|stored| stored.story_id == run.story_id);
        let expected = latest.map_or(1, |stored| stored.sequence + 1);
        if run.sequence != expected {
            return Err(StoreError::Conflict(format!(
                "story {} expects run sequence {expected}, got {}",
                run.story_id, run.sequence
            )));
        }
        runs.push(run.clone());
        Ok(())
    }

    fn runs_for_story(&self, story_id: &StoryId) -> Result<Vec<ValidationRun>, StoreError> {
        let runs = self.lock()?;
        Ok(runs.iter().filter(|run| &run.story_id == story_id).cloned().collect())
    }

    fn all_runs(&self) -> Result<Vec<ValidationRun>, StoreError> {
        Ok(self.lock()?.clone())
    }
}
