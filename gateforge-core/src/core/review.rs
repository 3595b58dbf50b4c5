// gateforge-core/src/core/review.rs
// ============================================================================
// Module: GateForge Review Model
// Description: Human review decisions for NEEDS_REVIEW outcomes.
// Purpose: Provide review decision parsing and validation.
// Dependencies: chrono, serde, thiserror
// ============================================================================

//! ## Overview
//! A review decision records how a human resolved a NEEDS_REVIEW summary.
//! High-risk proposals require a second reviewer; the resolver enforces that
//! rule, this module only validates the record shape.

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current review decision schema version.
pub const REVIEW_SCHEMA_VERSION: &str = "0.1.0";

// ============================================================================
// SECTION: Review Decision
// ============================================================================

/// Verdict a reviewer may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    /// Accept the change.
    Approve,
    /// Reject the change.
    Reject,
}

/// Human review decision artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecision {
    /// Review decision schema version.
    pub schema_version: String,
    /// Unique review identifier.
    pub review_id: String,
    /// Proposal the review applies to.
    pub proposal_id: String,
    /// Primary reviewer identity.
    pub reviewer: String,
    /// Primary verdict.
    pub decision: ReviewVerdict,
    /// Reviewer rationale.
    pub rationale: String,
    /// Whether every required human check was completed.
    pub all_required_checks_completed: bool,
    /// Checks the reviewer explicitly confirmed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confirmed_checks: Vec<String>,
    /// Second reviewer identity, required for high-risk approvals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_reviewer: Option<String>,
    /// Second reviewer verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_decision: Option<ReviewVerdict>,
    /// UTC timestamp when review was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at_utc: Option<String>,
    /// UTC timestamp when review was completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at_utc: Option<String>,
}

/// Errors raised when a review decision fails validation.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Schema version is not supported.
    #[error("schema_version must be {expected}, got {actual}")]
    SchemaVersion {
        /// Required version.
        expected: &'static str,
        /// Observed version.
        actual: String,
    },
    /// A required string field is empty.
    #[error("{field} must be a non-empty string")]
    EmptyField {
        /// Offending field name.
        field: &'static str,
    },
    /// A timestamp could not be parsed as ISO-8601 UTC.
    #[error("{field} must be an ISO-8601 UTC timestamp: {value}")]
    BadTimestamp {
        /// Offending field name.
        field: &'static str,
        /// Observed value.
        value: String,
    },
}

impl ReviewDecision {
    /// Validates the review decision record.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ReviewError> {
        if self.schema_version != REVIEW_SCHEMA_VERSION {
            return Err(ReviewError::SchemaVersion {
                expected: REVIEW_SCHEMA_VERSION,
                actual: self.schema_version.clone(),
            });
        }
        require_non_empty(&self.review_id, "review_id")?;
        require_non_empty(&self.proposal_id, "proposal_id")?;
        require_non_empty(&self.reviewer, "reviewer")?;
        require_non_empty(&self.rationale, "rationale")?;
        if let Some(second) = &self.second_reviewer {
            require_non_empty(second, "second_reviewer")?;
        }
        for (field, value) in [
            ("requested_at_utc", &self.requested_at_utc),
            ("reviewed_at_utc", &self.reviewed_at_utc),
        ] {
            if let Some(raw) = value {
                parse_utc(raw).ok_or_else(|| ReviewError::BadTimestamp {
                    field,
                    value: raw.clone(),
                })?;
            }
        }
        Ok(())
    }

    /// Seconds between request and completion when both timestamps parse.
    #[must_use]
    pub fn resolution_seconds(&self) -> Option<f64> {
        let requested = parse_utc(self.requested_at_utc.as_deref()?)?;
        let reviewed = parse_utc(self.reviewed_at_utc.as_deref()?)?;
        let delta = (reviewed - requested).num_milliseconds();
        Some(delta as f64 / 1000.0)
    }
}

/// Parses an ISO-8601 timestamp into UTC, accepting a trailing `Z`.
#[must_use]
pub fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim()).ok().map(|dt| dt.with_timezone(&Utc))
}

fn require_non_empty(value: &str, field: &'static str) -> Result<(), ReviewError> {
    if value.trim().is_empty() {
        return Err(ReviewError::EmptyField {
            field,
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
