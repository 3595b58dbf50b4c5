// gateforge-core/src/core/decision.rs
// ============================================================================
// Module: GateForge Decision Model
// Description: Governance decisions, run statuses, and risk levels.
// Purpose: Provide the ordered decision vocabulary used across the pipeline.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Decisions are ordered FAIL < NEEDS_REVIEW < PASS; every comparison in the
//! pipeline (repair deltas, governance trends, promotion ranking) reduces to
//! the scores defined here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Governance decision for a comparison or overlay result.
///
/// # Invariants
/// - Ordering is `Fail < NeedsReview < Pass` via [`Decision::score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Decision {
    /// Change is acceptable without human involvement.
    #[serde(rename = "PASS")]
    Pass,
    /// Change requires human review before acceptance.
    #[serde(rename = "NEEDS_REVIEW")]
    NeedsReview,
    /// Change is rejected.
    #[serde(rename = "FAIL")]
    #[default]
    Fail,
}

impl Decision {
    /// Returns the ordering score (higher is better).
    #[must_use]
    pub const fn score(self) -> i8 {
        match self {
            Self::Pass => 2,
            Self::NeedsReview => 1,
            Self::Fail => 0,
        }
    }

    /// Returns the worse of two decisions.
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        if self.score() <= other.score() { self } else { other }
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::NeedsReview => "NEEDS_REVIEW",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Final status of a proposal-driven run or derived summary.
///
/// `Unknown` marks interrupted or unparseable outcomes and never wins a
/// comparison against a concrete decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run completed and passed the policy overlay.
    #[serde(rename = "PASS")]
    Pass,
    /// Run requires human review.
    #[serde(rename = "NEEDS_REVIEW")]
    NeedsReview,
    /// Run failed.
    #[serde(rename = "FAIL")]
    Fail,
    /// Run was interrupted or its outcome could not be derived.
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl RunStatus {
    /// Returns the ordering score (higher is better, `Unknown` lowest).
    #[must_use]
    pub const fn score(self) -> i8 {
        match self {
            Self::Pass => 2,
            Self::NeedsReview => 1,
            Self::Fail => 0,
            Self::Unknown => -1,
        }
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::NeedsReview => "NEEDS_REVIEW",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parses a status label, mapping anything unrecognized to `Unknown`.
    #[must_use]
    pub fn from_label(value: &str) -> Self {
        match value {
            "PASS" => Self::Pass,
            "NEEDS_REVIEW" => Self::NeedsReview,
            "FAIL" => Self::Fail,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Decision> for RunStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Pass => Self::Pass,
            Decision::NeedsReview => Self::NeedsReview,
            Decision::Fail => Self::Fail,
        }
    }
}

// ============================================================================
// SECTION: Risk Level
// ============================================================================

/// Declared risk level of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Routine change.
    Low,
    /// Change with meaningful blast radius.
    Medium,
    /// Change requiring the strictest gating.
    High,
}

impl RiskLevel {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Delta Relation
// ============================================================================

/// Relation between a before and after status under the decision ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaRelation {
    /// After scores strictly higher than before.
    Improved,
    /// Scores are equal.
    Unchanged,
    /// After scores strictly lower than before.
    Worse,
}

impl DeltaRelation {
    /// Derives the relation from two run statuses.
    #[must_use]
    pub const fn from_statuses(before: RunStatus, after: RunStatus) -> Self {
        if after.score() > before.score() {
            Self::Improved
        } else if after.score() < before.score() {
            Self::Worse
        } else {
            Self::Unchanged
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
