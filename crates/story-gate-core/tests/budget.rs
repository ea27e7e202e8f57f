// crates/story-gate-core/tests/budget.rs
// ============================================================================
// Module: Budget Monitor Tests
// Description: Tests for budget tiers, calendar windows, and alerts.
// ============================================================================
//! ## Overview
//! Validates tier classification at the configured fractions, calendar
//! window boundaries, budget validation, and alert auditing.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use story_gate_core::AgentId;
use story_gate_core::AuditEvent;
use story_gate_core::Budget;
use story_gate_core::BudgetMonitor;
use story_gate_core::BudgetPeriod;
use story_gate_core::BudgetTier;
use story_gate_core::CostEvent;
use story_gate_core::CostLedger;
use story_gate_core::InMemoryCostLedgerStore;
use story_gate_core::ModelId;
use story_gate_core::ModelPricing;
use story_gate_core::Money;
use story_gate_core::PricingTable;
use story_gate_core::Timestamp;
use story_gate_core::runtime::InMemoryAuditSink;
use story_gate_core::runtime::validate_budgets;

const HOUR: i64 = 3_600_000;
/// 2026-03-10 00:00 UTC, a Tuesday.
const T0: i64 = 1_773_100_800_000;

fn money(value: &str) -> Money {
    Money::parse(value).expect("money")
}

fn at(hours: i64) -> Timestamp {
    Timestamp::from_unix_millis(T0 + hours * HOUR)
}

/// Ledger priced at one unit per thousand input tokens.
fn ledger() -> Arc<CostLedger<InMemoryCostLedgerStore>> {
    let mut models = BTreeMap::new();
    models.insert(ModelId::new("flat"), ModelPricing {
        input_per_1k: money("1"),
        output_per_1k: money("0"),
    });
    Arc::new(CostLedger::new(InMemoryCostLedgerStore::new(), PricingTable::new(models).expect("pricing")))
}

fn spend(ledger: &CostLedger<InMemoryCostLedgerStore>, hours: i64, tokens: u64) {
    ledger
        .record(CostEvent {
            timestamp: at(hours),
            agent_id: AgentId::new("alpha"),
            model_id: ModelId::new("flat"),
            input_tokens: tokens,
            output_tokens: 0,
            story_id: None,
            description: "usage".to_string(),
        })
        .expect("record");
}

fn budget(period: BudgetPeriod, ceiling: &str) -> Budget {
    Budget {
        period,
        ceiling: money(ceiling),
        warning_fraction: money("0.8"),
        critical_fraction: money("0.95"),
    }
}

/// Verifies 92% of the daily ceiling is a warning, not critical.
#[test]
fn spend_above_warning_fraction_is_warning() {
    let ledger = ledger();
    spend(&ledger, 1, 9_200);
    let monitor = BudgetMonitor::new(ledger, vec![budget(BudgetPeriod::Daily, "10")]).expect("monitor");

    let status = monitor.check_budget(BudgetPeriod::Daily, at(2)).expect("check").expect("daily");
    assert_eq!(status.spent, money("9.2"));
    assert_eq!(status.fraction_used, money("0.92"));
    assert_eq!(status.tier, BudgetTier::Warning);
}

#[test]
fn single_event_can_jump_straight_to_critical() {
    let ledger = ledger();
    let monitor = BudgetMonitor::new(ledger.clone(), vec![budget(BudgetPeriod::Daily, "10")]).expect("monitor");
    assert_eq!(
        monitor.check_budget(BudgetPeriod::Daily, at(1)).expect("check").expect("daily").tier,
        BudgetTier::None
    );

    spend(&ledger, 2, 9_600);
    let status = monitor.check_budget(BudgetPeriod::Daily, at(3)).expect("check").expect("daily");
    assert_eq!(status.tier, BudgetTier::Critical);
}

#[test]
fn exact_warning_fraction_is_inclusive() {
    let ledger = ledger();
    spend(&ledger, 1, 8_000);
    let monitor = BudgetMonitor::new(ledger, vec![budget(BudgetPeriod::Daily, "10")]).expect("monitor");
    let status = monitor.check_budget(BudgetPeriod::Daily, at(2)).expect("check").expect("daily");
    assert_eq!(status.tier, BudgetTier::Warning);
}

/// Verifies the weekly window starts on the Monday before `now`.
#[test]
fn weekly_budget_uses_calendar_week() {
    let ledger = ledger();
    spend(&ledger, -47, 5_000);
    spend(&ledger, -23, 1_000);
    spend(&ledger, 1, 1_000);
    let monitor = BudgetMonitor::new(ledger, vec![budget(BudgetPeriod::Weekly, "10")]).expect("monitor");

    let status = monitor.check_budget(BudgetPeriod::Weekly, at(2)).expect("check").expect("weekly");
    assert_eq!(status.spent, money("2"));
    assert_eq!(status.window.start, at(-24));
    assert_eq!(status.tier, BudgetTier::None);
}

#[test]
fn project_total_counts_everything() {
    let ledger = ledger();
    spend(&ledger, -1_000, 4_000);
    spend(&ledger, 1, 4_000);
    let monitor =
        BudgetMonitor::new(ledger, vec![budget(BudgetPeriod::ProjectTotal, "10")]).expect("monitor");
    let status = monitor.check_budget(BudgetPeriod::ProjectTotal, at(2)).expect("check").expect("total");
    assert_eq!(status.spent, money("8"));
    assert_eq!(status.tier, BudgetTier::Warning);
}

#[test]
fn unconfigured_period_returns_none() {
    let monitor = BudgetMonitor::new(ledger(), vec![budget(BudgetPeriod::Daily, "10")]).expect("monitor");
    assert!(monitor.check_budget(BudgetPeriod::Monthly, at(1)).expect("check").is_none());
}

#[test]
fn invalid_budgets_are_rejected() {
    let zero_ceiling = budget(BudgetPeriod::Daily, "0");
    assert!(validate_budgets(&[zero_ceiling]).is_err());

    let mut inverted = budget(BudgetPeriod::Daily, "10");
    inverted.warning_fraction = money("0.99");
    assert!(validate_budgets(&[inverted]).is_err());

    let duplicate = vec![budget(BudgetPeriod::Daily, "10"), budget(BudgetPeriod::Daily, "20")];
    assert!(BudgetMonitor::new(ledger(), duplicate).is_err());
}

#[test]
fn reload_rejects_invalid_budgets_and_keeps_previous() {
    let monitor = BudgetMonitor::new(ledger(), vec![budget(BudgetPeriod::Daily, "10")]).expect("monitor");
    assert!(monitor.reload(vec![budget(BudgetPeriod::Daily, "-1")]).is_err());
    assert_eq!(monitor.budgets().len(), 1);
    assert_eq!(monitor.budgets()[0].ceiling, money("10"));

    monitor.reload(vec![budget(BudgetPeriod::Monthly, "100")]).expect("reload");
    assert_eq!(monitor.budgets()[0].period, BudgetPeriod::Monthly);
}

#[test]
fn alerts_only_report_crossed_budgets_and_are_audited() {
    let ledger = ledger();
    spend(&ledger, 1, 9_700);
    let sink = Arc::new(InMemoryAuditSink::new());
    let monitor = BudgetMonitor::new(ledger, vec![
        budget(BudgetPeriod::Daily, "10"),
        budget(BudgetPeriod::Monthly, "1000"),
    ])
    .expect("monitor")
    .with_audit(sink.clone());

    let alerts = monitor.alerts(at(2)).expect("alerts");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].period, BudgetPeriod::Daily);
    assert_eq!(alerts[0].tier, BudgetTier::Critical);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        AuditEvent::BudgetAlert {
            tier: BudgetTier::Critical,
            ..
        }
    ));
}
