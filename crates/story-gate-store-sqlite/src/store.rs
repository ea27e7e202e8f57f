// crates/story-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Gate Store
// Description: Durable baseline, cost ledger, and run history backed by SQLite WAL.
// Purpose: Persist gate state with deterministic serialization and integrity checks.
// Dependencies: story-gate-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteGateStore`] implements [`BaselineStore`], [`CostLedgerStore`], and
//! [`RunHistoryStore`] over a single database. Cost events and validation
//! runs are stored as canonical JSON with a stored hash; baseline history
//! rows carry a hash of their canonical entry. Loads recompute the hash and
//! fail closed on mismatch.
//!
//! Every mutation runs inside one transaction on a mutex-guarded connection,
//! which serializes writes per key and keeps ledger appends atomic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use story_gate_core::Baseline;
use story_gate_core::BaselineEntry;
use story_gate_core::BaselineOrigin;
use story_gate_core::BaselineStore;
use story_gate_core::CostEvent;
use story_gate_core::CostLedgerStore;
use story_gate_core::HashAlgorithm;
use story_gate_core::HashDigest;
use story_gate_core::LedgerAppendError;
use story_gate_core::LedgerEntry;
use story_gate_core::MetricName;
use story_gate_core::Money;
use story_gate_core::ProjectId;
use story_gate_core::RunHistoryStore;
use story_gate_core::SeedOutcome;
use story_gate_core::StoreError;
use story_gate_core::StoryId;
use story_gate_core::TimeWindow;
use story_gate_core::Timestamp;
use story_gate_core::ValidationRun;
use story_gate_core::hashing::DEFAULT_HASH_ALGORITHM;
use story_gate_core::hashing::canonical_json_bytes;
use story_gate_core::hashing::hash_bytes;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 2;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum canonical JSON payload size for a stored row.
pub const MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` gate store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default pragmas for `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::Wal,
            sync_mode: SqliteSyncMode::Full,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Write conflicts with stored rows.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "payload exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps a rusqlite error into a store error.
#[allow(clippy::needless_pass_by_value, reason = "Used as a map_err adapter.")]
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed gate store.
///
/// # Invariants
/// - Loads verify stored hashes before deserialization.
/// - Connection access is serialized through a mutex; clones share it.
#[derive(Clone)]
pub struct SqliteGateStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteGateStore {
    /// Opens an `SQLite`-backed gate store, creating the schema when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "sqlite gate store opened");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies every stored payload against its hash.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] for the first mismatching row.
    pub fn integrity_check(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        load_ledger_entries(&guard, &TimeWindow::unbounded())?;
        load_all_runs(&guard)?;
        let mut statement = guard
            .prepare("SELECT DISTINCT project_id, metric FROM baselines")
            .map_err(db_error)?;
        let keys = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        for (project, metric) in keys {
            load_history(&guard, &ProjectId::new(project), &MetricName::new(metric))?;
        }
        Ok(())
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Baselines
// ============================================================================

impl BaselineStore for SqliteGateStore {
    fn get(
        &self,
        project: &ProjectId,
        metric: &MetricName,
    ) -> Result<Option<Baseline>, StoreError> {
        let guard = self.lock()?;
        let history = load_history(&guard, project, metric)?;
        Ok((!history.is_empty()).then(|| baseline_view(project, metric, history)))
    }

    fn append(
        &self,
        project: &ProjectId,
        metric: &MetricName,
        entry: BaselineEntry,
    ) -> Result<Baseline, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        insert_history_entry(&tx, project, metric, &entry)?;
        let history = load_history(&tx, project, metric)?;
        tx.commit().map_err(db_error)?;
        Ok(baseline_view(project, metric, history))
    }

    fn seed_if_absent(
        &self,
        project: &ProjectId,
        metric: &MetricName,
        entry: BaselineEntry,
    ) -> Result<SeedOutcome, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let existing = load_history(&tx, project, metric)?;
        if !existing.is_empty() {
            return Ok(SeedOutcome::Existing(baseline_view(project, metric, existing)));
        }
        insert_history_entry(&tx, project, metric, &entry)?;
        let history = load_history(&tx, project, metric)?;
        tx.commit().map_err(db_error)?;
        Ok(SeedOutcome::Seeded(baseline_view(project, metric, history)))
    }

    fn list(&self, project: &ProjectId) -> Result<Vec<Baseline>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare("SELECT metric FROM baselines WHERE project_id = ?1 ORDER BY metric")
            .map_err(db_error)?;
        let metrics = statement
            .query_map(params![project.as_str()], |row| row.get::<_, String>(0))
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        let mut baselines = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let metric = MetricName::new(metric);
            let history = load_history(&guard, project, &metric)?;
            baselines.push(baseline_view(project, &metric, history));
        }
        Ok(baselines)
    }
}

/// Builds a baseline view of a stored history.
fn baseline_view(project: &ProjectId, metric: &MetricName, history: Vec<BaselineEntry>) -> Baseline {
    Baseline {
        project_id: project.clone(),
        metric: metric.clone(),
        history,
    }
}

/// Appends a history row and bumps the key's entry count.
fn insert_history_entry(
    tx: &Transaction<'_>,
    project: &ProjectId,
    metric: &MetricName,
    entry: &BaselineEntry,
) -> Result<(), SqliteStoreError> {
    if !entry.value.is_finite() {
        return Err(SqliteStoreError::Invalid("baseline value must be finite".to_string()));
    }
    let count: Option<i64> = tx
        .query_row(
            "SELECT entry_count FROM baselines WHERE project_id = ?1 AND metric = ?2",
            params![project.as_str(), metric.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    let position = count.unwrap_or(0) + 1;
    let bytes = encode_payload(entry)?;
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
    tx.execute(
        "INSERT INTO baselines (project_id, metric, entry_count) VALUES (?1, ?2, ?3)
         ON CONFLICT (project_id, metric) DO UPDATE SET entry_count = excluded.entry_count",
        params![project.as_str(), metric.as_str(), position],
    )
    .map_err(db_error)?;
    tx.execute(
        "INSERT INTO baseline_history (project_id, metric, position, value, recorded_at, note, \
         origin, entry_hash, hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            project.as_str(),
            metric.as_str(),
            position,
            entry.value,
            entry.recorded_at.as_unix_millis(),
            entry.note,
            entry.origin.label(),
            digest.value,
            digest.algorithm.label(),
        ],
    )
    .map_err(db_error)?;
    Ok(())
}

/// Loads and verifies the history for a key in append order.
fn load_history(
    connection: &Connection,
    project: &ProjectId,
    metric: &MetricName,
) -> Result<Vec<BaselineEntry>, SqliteStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT position, value, recorded_at, note, origin, entry_hash, hash_algorithm
             FROM baseline_history WHERE project_id = ?1 AND metric = ?2 ORDER BY position",
        )
        .map_err(db_error)?;
    let rows = statement
        .query_map(params![project.as_str(), metric.as_str()], |row| {
            Ok(HistoryRow {
                position: row.get(0)?,
                value: row.get(1)?,
                recorded_at: row.get(2)?,
                note: row.get(3)?,
                origin: row.get(4)?,
                hash_value: row.get(5)?,
                hash_algorithm: row.get(6)?,
            })
        })
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    let mut history = Vec::with_capacity(rows.len());
    for row in rows {
        let origin = BaselineOrigin::from_label(&row.origin).ok_or_else(|| {
            SqliteStoreError::Invalid(format!("unknown baseline origin: {}", row.origin))
        })?;
        let entry = BaselineEntry {
            value: row.value,
            recorded_at: Timestamp::from_unix_millis(row.recorded_at),
            note: row.note,
            origin,
        };
        let stored = HashDigest {
            algorithm: parse_hash_algorithm(&row.hash_algorithm)?,
            value: row.hash_value,
        };
        if !stored.matches(&encode_payload(&entry)?) {
            warn!(
                project = %project,
                metric = %metric,
                position = row.position,
                "baseline hash mismatch"
            );
            return Err(SqliteStoreError::Corrupt(format!(
                "hash mismatch for baseline {project}/{metric} entry {}",
                row.position
            )));
        }
        history.push(entry);
    }
    Ok(history)
}

/// Raw baseline history row.
struct HistoryRow {
    /// One-based position within the key's history.
    position: i64,
    /// Stored value.
    value: f64,
    /// Stored unix millis.
    recorded_at: i64,
    /// Stored note.
    note: Option<String>,
    /// Stored origin label.
    origin: String,
    /// Stored hash value.
    hash_value: String,
    /// Stored hash algorithm label.
    hash_algorithm: String,
}

// ============================================================================
// SECTION: Cost Ledger
// ============================================================================

impl CostLedgerStore for SqliteGateStore {
    fn append(&self, event: CostEvent, cost: Money) -> Result<LedgerEntry, LedgerAppendError> {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| StoreError::from(db_error(err)))?;
        let latest: Option<(i64, i64)> = tx
            .query_row(
                "SELECT sequence, recorded_at FROM cost_events ORDER BY sequence DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| StoreError::from(db_error(err)))?;
        if let Some((_, latest_at)) = latest
            && event.timestamp.as_unix_millis() < latest_at
        {
            return Err(LedgerAppendError::OutOfOrder {
                latest: Timestamp::from_unix_millis(latest_at),
                attempted: event.timestamp,
            });
        }
        let sequence = latest.map_or(1, |(sequence, _)| sequence + 1);
        let entry = LedgerEntry {
            sequence: u64::try_from(sequence)
                .map_err(|_| StoreError::Invalid("ledger sequence out of range".to_string()))?,
            event,
            cost,
        };
        let bytes = encode_payload(&entry).map_err(StoreError::from)?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        tx.execute(
            "INSERT INTO cost_events (sequence, recorded_at, entry_json, entry_hash, \
             hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sequence,
                entry.event.timestamp.as_unix_millis(),
                bytes,
                digest.value,
                digest.algorithm.label(),
            ],
        )
        .map_err(|err| StoreError::from(db_error(err)))?;
        tx.commit().map_err(|err| StoreError::from(db_error(err)))?;
        Ok(entry)
    }

    fn entries(&self, window: &TimeWindow) -> Result<Vec<LedgerEntry>, StoreError> {
        let guard = self.lock()?;
        Ok(load_ledger_entries(&guard, window)?)
    }
}

/// Loads and verifies ledger entries inside a window.
fn load_ledger_entries(
    connection: &Connection,
    window: &TimeWindow,
) -> Result<Vec<LedgerEntry>, SqliteStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT sequence, entry_json, entry_hash, hash_algorithm FROM cost_events
             WHERE recorded_at >= ?1 AND recorded_at <= ?2 ORDER BY sequence",
        )
        .map_err(db_error)?;
    let rows = statement
        .query_map(
            params![window.start.as_unix_millis(), window.end.as_unix_millis()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    StoredPayload {
                        bytes: row.get(1)?,
                        hash_value: row.get(2)?,
                        hash_algorithm: row.get(3)?,
                    },
                ))
            },
        )
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    let mut entries = Vec::with_capacity(rows.len());
    for (sequence, payload) in rows {
        let entry: LedgerEntry = payload.verify(&format!("cost event {sequence}"))?;
        if i64::try_from(entry.sequence).ok() != Some(sequence) {
            return Err(SqliteStoreError::Invalid(format!(
                "sequence mismatch between key and payload for cost event {sequence}"
            )));
        }
        entries.push(entry);
    }
    Ok(entries)
}

// ============================================================================
// SECTION: Run History
// ============================================================================

impl RunHistoryStore for SqliteGateStore {
    fn append_run(&self, run: &ValidationRun) -> Result<(), StoreError> {
        let bytes = encode_payload(run)?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        let sequence = i64::try_from(run.sequence)
            .map_err(|_| StoreError::Invalid("run sequence out of range".to_string()))?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let latest: Option<i64> = tx
            .query_row(
                "SELECT MAX(sequence) FROM validation_runs WHERE story_id = ?1",
                params![run.story_id.as_str()],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        let expected = latest.unwrap_or(0) + 1;
        if sequence != expected {
            return Err(SqliteStoreError::Conflict(format!(
                "story {} expects run sequence {expected}, got {}",
                run.story_id, run.sequence
            ))
            .into());
        }
        tx.execute(
            "INSERT INTO validation_runs (story_id, sequence, requested_at, run_json, run_hash, \
             hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.story_id.as_str(),
                sequence,
                run.requested_at.as_unix_millis(),
                bytes,
                digest.value,
                digest.algorithm.label(),
            ],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        Ok(())
    }

    fn runs_for_story(&self, story_id: &StoryId) -> Result<Vec<ValidationRun>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT sequence, run_json, run_hash, hash_algorithm FROM validation_runs
                 WHERE story_id = ?1 ORDER BY sequence",
            )
            .map_err(db_error)?;
        let rows = statement
            .query_map(params![story_id.as_str()], map_run_row)
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        let runs = rows
            .into_iter()
            .map(|(key, payload)| decode_run(story_id.as_str(), key, payload))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn all_runs(&self) -> Result<Vec<ValidationRun>, StoreError> {
        let guard = self.lock()?;
        Ok(load_all_runs(&guard)?)
    }
}

/// Maps a validation run row into its key and payload.
fn map_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, StoredPayload)> {
    Ok((
        row.get(0)?,
        StoredPayload {
            bytes: row.get(1)?,
            hash_value: row.get(2)?,
            hash_algorithm: row.get(3)?,
        },
    ))
}

/// Loads every run in append order.
fn load_all_runs(connection: &Connection) -> Result<Vec<ValidationRun>, SqliteStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT story_id, sequence, run_json, run_hash, hash_algorithm FROM validation_runs
             ORDER BY append_order",
        )
        .map_err(db_error)?;
    let rows = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                StoredPayload {
                    bytes: row.get(2)?,
                    hash_value: row.get(3)?,
                    hash_algorithm: row.get(4)?,
                },
            ))
        })
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    rows.into_iter().map(|(story, key, payload)| decode_run(&story, key, payload)).collect()
}

/// Verifies a stored run and checks it against its row key.
fn decode_run(
    story: &str,
    sequence: i64,
    payload: StoredPayload,
) -> Result<ValidationRun, SqliteStoreError> {
    let run: ValidationRun = payload.verify(&format!("run {story}#{sequence}"))?;
    if run.story_id.as_str() != story || i64::try_from(run.sequence).ok() != Some(sequence) {
        return Err(SqliteStoreError::Invalid(format!(
            "run key mismatch between row and payload for {story}#{sequence}"
        )));
    }
    Ok(run)
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Raw hashed payload read from a row.
#[derive(Debug)]
struct StoredPayload {
    /// Stored canonical JSON bytes.
    bytes: Vec<u8>,
    /// Stored hash value.
    hash_value: String,
    /// Stored hash algorithm label.
    hash_algorithm: String,
}

impl StoredPayload {
    /// Verifies the stored hash and decodes the payload.
    fn verify<T: for<'de> Deserialize<'de>>(self, label: &str) -> Result<T, SqliteStoreError> {
        if self.bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_PAYLOAD_BYTES,
                actual_bytes: self.bytes.len(),
            });
        }
        let stored = HashDigest {
            algorithm: parse_hash_algorithm(&self.hash_algorithm)?,
            value: self.hash_value,
        };
        if !stored.matches(&self.bytes) {
            warn!(row = label, "stored payload hash mismatch");
            return Err(SqliteStoreError::Corrupt(format!("hash mismatch for {label}")));
        }
        serde_json::from_slice(&self.bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
    }
}

/// Encodes a payload as canonical JSON within the size limit.
fn encode_payload<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, SqliteStoreError> {
    let bytes =
        canonical_json_bytes(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_PAYLOAD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Parses a hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    HashAlgorithm::from_label(label)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("unsupported hash algorithm: {label}")))
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

/// Creates the parent directory of the database file.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_error)?;
    Ok(connection)
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS baselines (
                    project_id TEXT NOT NULL,
                    metric TEXT NOT NULL,
                    entry_count INTEGER NOT NULL,
                    PRIMARY KEY (project_id, metric)
                );
                CREATE TABLE IF NOT EXISTS baseline_history (
                    project_id TEXT NOT NULL,
                    metric TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    value REAL NOT NULL,
                    recorded_at INTEGER NOT NULL,
                    note TEXT,
                    origin TEXT NOT NULL,
                    entry_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    PRIMARY KEY (project_id, metric, position),
                    FOREIGN KEY (project_id, metric)
                        REFERENCES baselines(project_id, metric) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS cost_events (
                    sequence INTEGER PRIMARY KEY,
                    recorded_at INTEGER NOT NULL,
                    entry_json BLOB NOT NULL,
                    entry_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_cost_events_recorded_at
                    ON cost_events (recorded_at);
                CREATE TABLE IF NOT EXISTS validation_runs (
                    append_order INTEGER PRIMARY KEY AUTOINCREMENT,
                    story_id TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    requested_at INTEGER NOT NULL,
                    run_json BLOB NOT NULL,
                    run_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    UNIQUE (story_id, sequence)
                );",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
