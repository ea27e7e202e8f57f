// crates/story-gate-core/src/runtime/budget.rs
// ============================================================================
// Module: Story Gate Budget Monitor
// Description: Tiered budget checks over the cost ledger.
// Purpose: Raise WARNING and CRITICAL alerts as spend approaches ceilings.
// Dependencies: crate::core, crate::runtime::ledger, tracing
// ============================================================================

//! ## Overview
//! Budgets are a reloadable snapshot checked against ledger aggregates for an
//! explicit `now`. Checks never block recording; a single event may move a
//! budget from below WARNING straight to CRITICAL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tracing::warn;

use crate::core::Budget;
use crate::core::BudgetError;
use crate::core::BudgetPeriod;
use crate::core::BudgetStatus;
use crate::core::BudgetTier;
use crate::core::CostFilter;
use crate::core::Timestamp;
use crate::interfaces::CostLedgerStore;
use crate::runtime::audit::AuditEvent;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::ledger::CostLedger;
use crate::runtime::ledger::LedgerError;
use crate::runtime::snapshot::SnapshotCell;

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Budget monitor over a shared ledger.
pub struct BudgetMonitor<C> {
    /// Ledger the budgets are measured against.
    ledger: Arc<CostLedger<C>>,
    /// Current budget snapshot.
    budgets: SnapshotCell<Vec<Budget>>,
    /// Audit sink for alerts.
    audit: Arc<dyn AuditSink>,
}

/// Validates a budget set: each budget is well formed and periods are unique.
///
/// # Errors
///
/// Returns [`BudgetError::Invalid`] on the first malformed budget.
pub fn validate_budgets(budgets: &[Budget]) -> Result<(), BudgetError> {
    for (index, budget) in budgets.iter().enumerate() {
        budget.validate()?;
        if budgets[..index].iter().any(|other| other.period == budget.period) {
            return Err(BudgetError::Invalid(format!("duplicate {} budget", budget.period)));
        }
    }
    Ok(())
}

impl<C: CostLedgerStore> BudgetMonitor<C> {
    /// Creates a monitor.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError`] when a budget is malformed.
    pub fn new(ledger: Arc<CostLedger<C>>, budgets: Vec<Budget>) -> Result<Self, BudgetError> {
        validate_budgets(&budgets)?;
        Ok(Self {
            ledger,
            budgets: SnapshotCell::new(budgets),
            audit: Arc::new(NoopAuditSink),
        })
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the current budget snapshot.
    #[must_use]
    pub fn budgets(&self) -> Arc<Vec<Budget>> {
        self.budgets.load()
    }

    /// Swaps in a new budget set after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError`] and keeps the previous snapshot when invalid.
    pub fn reload(&self, budgets: Vec<Budget>) -> Result<(), BudgetError> {
        validate_budgets(&budgets)?;
        self.budgets.swap(budgets);
        self.audit.record(&AuditEvent::ConfigReloaded {
            component: "budgets".to_string(),
            digest: None,
        });
        Ok(())
    }

    /// Checks the budget for one period; `None` when no such budget exists.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when aggregation fails.
    pub fn check_budget(
        &self,
        period: BudgetPeriod,
        now: Timestamp,
    ) -> Result<Option<BudgetStatus>, LedgerError> {
        let budgets = self.budgets.load();
        budgets
            .iter()
            .find(|budget| budget.period == period)
            .map(|budget| self.status(budget, now))
            .transpose()
    }

    /// Checks every configured budget in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when aggregation fails.
    pub fn check_all(&self, now: Timestamp) -> Result<Vec<BudgetStatus>, LedgerError> {
        let budgets = self.budgets.load();
        budgets.iter().map(|budget| self.status(budget, now)).collect()
    }

    /// Returns budgets at WARNING or above and emits an audit alert for each.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when aggregation fails.
    pub fn alerts(&self, now: Timestamp) -> Result<Vec<BudgetStatus>, LedgerError> {
        let statuses = self.check_all(now)?;
        self.emit_alerts(&statuses);
        Ok(statuses.into_iter().filter(|status| status.tier != BudgetTier::None).collect())
    }

    /// Logs and audits every status at WARNING or above.
    pub fn emit_alerts(&self, statuses: &[BudgetStatus]) {
        for status in statuses.iter().filter(|status| status.tier != BudgetTier::None) {
            warn!(
                period = %status.period,
                critical = status.tier == BudgetTier::Critical,
                spent = %status.spent,
                ceiling = %status.ceiling,
                "budget threshold crossed"
            );
            self.audit.record(&AuditEvent::BudgetAlert {
                period: status.period,
                tier: status.tier,
                spent: status.spent.clone(),
                ceiling: status.ceiling.clone(),
            });
        }
    }

    /// Computes the status of one budget.
    fn status(&self, budget: &Budget, now: Timestamp) -> Result<BudgetStatus, LedgerError> {
        let aggregate = self.ledger.aggregate(budget.period.period(), now, &CostFilter::default())?;
        let fraction_used = budget.fraction_used(&aggregate.total_cost);
        let tier = budget.tier_for(&fraction_used);
        Ok(BudgetStatus {
            period: budget.period,
            window: aggregate.window,
            ceiling: budget.ceiling.clone(),
            spent: aggregate.total_cost,
            fraction_used,
            tier,
        })
    }
}
