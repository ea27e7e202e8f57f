// crates/story-gate-core/src/core/time.rs
// ============================================================================
// Module: Story Gate Time Model
// Description: Canonical timestamp and closed time windows.
// Purpose: Keep ledger aggregation and run history replayable.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Story Gate never reads wall-clock time in the core. Hosts supply
//! timestamps on cost events and validation requests, and every aggregation
//! window is resolved against an explicit `now`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per hour.
pub const MILLIS_PER_HOUR: i64 = 60 * 60 * 1_000;
/// Milliseconds per day.
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds (UTC).
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp shifted back by `millis`, saturating at the minimum.
    #[must_use]
    pub const fn saturating_sub_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_sub(millis))
    }

    /// Converts the timestamp into a UTC date-time.
    #[must_use]
    pub fn to_datetime(self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000).ok()
    }

    /// Returns the UTC calendar date containing the timestamp.
    #[must_use]
    pub fn date(self) -> Option<Date> {
        self.to_datetime().map(OffsetDateTime::date)
    }

    /// Returns the start of a UTC calendar date as a timestamp.
    #[must_use]
    pub fn start_of_date(date: Date) -> Self {
        let nanos = date.midnight().assume_utc().unix_timestamp_nanos() / 1_000_000;
        Self(i64::try_from(nanos).unwrap_or(i64::MIN))
    }

    /// Returns the `YYYY-MM-DD` key of the UTC day containing the timestamp.
    #[must_use]
    pub fn day_key(self) -> String {
        self.date().map_or_else(
            || format!("day-{}", self.0.div_euclid(MILLIS_PER_DAY)),
            |date| {
                format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
            },
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ============================================================================
// SECTION: Time Window
// ============================================================================

/// Closed time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive window start.
    pub start: Timestamp,
    /// Inclusive window end.
    pub end: Timestamp,
}

impl TimeWindow {
    /// Creates a window, returning `None` when `start > end`.
    #[must_use]
    pub fn new(start: Timestamp, end: Timestamp) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Returns a window covering every representable timestamp.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: Timestamp(i64::MIN),
            end: Timestamp(i64::MAX),
        }
    }

    /// Returns true when the timestamp falls inside the window.
    #[must_use]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at <= self.end
    }
}
