// crates/story-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Story Gate Audit Logging
// Description: Structured audit events for validation runs and ledgers.
// Purpose: Emit JSON-lines audit records without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are serde-serializable records routed through an
//! [`AuditSink`]. Sinks are best effort: a failed write never fails the
//! operation being audited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::AgentId;
use crate::core::BudgetPeriod;
use crate::core::BudgetTier;
use crate::core::HashDigest;
use crate::core::MetricName;
use crate::core::ModelId;
use crate::core::Money;
use crate::core::ProjectId;
use crate::core::RunId;
use crate::core::StageKind;
use crate::core::StageOutcome;
use crate::core::StoryId;
use crate::core::Timestamp;
use crate::core::Verdict;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Audit event payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A validation run started.
    RunStarted {
        /// Run identifier.
        run_id: RunId,
        /// Story identifier.
        story_id: StoryId,
        /// Attributed agent.
        agent_id: AgentId,
        /// Request timestamp.
        requested_at: Timestamp,
    },
    /// A stage finished.
    StageCompleted {
        /// Run identifier.
        run_id: RunId,
        /// Stage kind.
        stage: StageKind,
        /// Stage outcome.
        outcome: StageOutcome,
    },
    /// A validation run was assembled.
    RunCompleted {
        /// Run identifier.
        run_id: RunId,
        /// Composite verdict.
        verdict: Verdict,
        /// Number of failing gates.
        reason_count: usize,
        /// Evidence digest.
        evidence_hash: HashDigest,
    },
    /// An operator accepted a baseline value.
    BaselineAccepted {
        /// Project identifier.
        project_id: ProjectId,
        /// Metric name.
        metric: MetricName,
        /// Accepted value.
        value: f64,
        /// Previous value, if any.
        previous: Option<f64>,
        /// Operator note.
        note: Option<String>,
    },
    /// A cost event was recorded.
    CostRecorded {
        /// Ledger sequence.
        sequence: u64,
        /// Attributed agent.
        agent_id: AgentId,
        /// Model used.
        model_id: ModelId,
        /// Computed cost.
        cost: Money,
    },
    /// A budget crossed a threshold.
    BudgetAlert {
        /// Budget period.
        period: BudgetPeriod,
        /// Alert tier.
        tier: BudgetTier,
        /// Spend in the period.
        spent: Money,
        /// Ceiling for the period.
        ceiling: Money,
    },
    /// A configuration snapshot was swapped in.
    ConfigReloaded {
        /// Snapshot component that changed.
        component: String,
        /// Digest of the new snapshot, when one exists.
        digest: Option<HashDigest>,
    },
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for Story Gate events.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// In-memory audit sink for tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditSink {
    /// Recorded events.
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
