// gateforge-core/src/core/invariant.rs
// ============================================================================
// Module: GateForge Physical Invariants
// Description: Declarative physical invariants checked against metrics.
// Purpose: Provide the invariant vocabulary for the invariant_guard checker.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Physical invariants are declared on proposals and evaluated by the
//! `invariant_guard` checker against candidate (and baseline) metrics.
//! Three kinds exist: value ranges, monotonic metric movement relative to the
//! baseline, and bounded deltas against the baseline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Invariant Model
// ============================================================================

/// Invariant kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantKind {
    /// Metric must stay within `[min, max]`.
    Range,
    /// Metric must not move against the declared direction vs baseline.
    Monotonic,
    /// Absolute delta vs baseline must not exceed `max_delta`.
    BoundedDelta,
}

impl InvariantKind {
    /// Returns the stable wire label used in violation reasons.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Monotonic => "monotonic",
            Self::BoundedDelta => "bounded_delta",
        }
    }
}

/// Declared monotonic direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonotonicDirection {
    /// Candidate value must not exceed the baseline value.
    NonIncreasing,
    /// Candidate value must not fall below the baseline value.
    NonDecreasing,
}

/// One declared physical invariant.
///
/// # Invariants
/// - `metric` must name a metric resolvable via `Metrics::get`.
/// - `range` requires `min`/`max`; `monotonic` requires `direction`;
///   `bounded_delta` requires `max_delta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalInvariant {
    /// Invariant kind.
    #[serde(rename = "type")]
    pub kind: InvariantKind,
    /// Metric name the invariant constrains.
    pub metric: String,
    /// Inclusive lower bound (range).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound (range).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Declared direction (monotonic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<MonotonicDirection>,
    /// Maximum absolute delta vs baseline (bounded_delta).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delta: Option<f64>,
}

impl PhysicalInvariant {
    /// Returns the violation reason string for this invariant.
    #[must_use]
    pub fn violation_reason(&self) -> String {
        format!("physical_invariant_{}_violated:{}", self.kind.as_str(), self.metric)
    }
}
