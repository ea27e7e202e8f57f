// crates/story-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Story Gate Identifiers
// Description: Canonical opaque identifiers for stories, agents, and ledgers.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque UTF-8 strings that serialize transparently. No
//! normalization is applied; two identifiers are equal iff their strings are
//! byte-identical.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an opaque string identifier with the shared accessor surface.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier!(
    /// Story identifier for a unit of delegated work.
    StoryId
);

string_identifier!(
    /// Agent identifier that work and spend are attributed to.
    AgentId
);

string_identifier!(
    /// Model identifier used to look up pricing.
    ModelId
);

string_identifier!(
    /// Project identifier scoping baselines.
    ProjectId
);

string_identifier!(
    /// Quality metric name (for example `type_errors`).
    MetricName
);

string_identifier!(
    /// Validation run identifier (`<story>#<sequence>`).
    RunId
);

string_identifier!(
    /// Pattern rule identifier inside a pattern library.
    RuleId
);

impl RunId {
    /// Builds the canonical run identifier for a story sequence number.
    #[must_use]
    pub fn for_story(story_id: &StoryId, sequence: u64) -> Self {
        Self(format!("{}#{sequence}", story_id.as_str()))
    }
}
