// gateforge-core/src/core/bundle.rs
// ============================================================================
// Module: GateForge Demo Bundle Summary
// Description: Structured summary of a demo bundle run pair.
// Purpose: Validate demo bundle summaries produced by external demo drivers.
// Dependencies: crate::core::{decision, evidence}, serde, thiserror
// ============================================================================

//! ## Overview
//! Demo drivers are external collaborators; the summary they emit is not.
//! A demo bundle summary records one proposal-flow run next to one
//! expected-fail checker demo, with per-step exit codes and result flags.
//! This module is the typed contract for that artifact so malformed bundle
//! summaries are rejected at the gate instead of drifting downstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::decision::Decision;
use crate::core::evidence::Gate;

// ============================================================================
// SECTION: Bundle Summary
// ============================================================================

/// Pass/fail flags for the bundle's constituent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleResultFlags {
    /// Whether the proposal flow ended as expected.
    pub proposal_flow: Gate,
    /// Whether the checker demo failed as expected.
    pub checker_demo_expected_fail: Gate,
}

/// Structured summary of one demo bundle run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoBundleSummary {
    /// Exit code of the proposal flow step.
    pub flow_exit_code: i64,
    /// Exit code of the checker demo step.
    pub checker_exit_code: i64,
    /// Final status of the proposal flow.
    pub proposal_flow_status: Decision,
    /// Final status of the checker demo.
    pub checker_demo_status: Decision,
    /// Policy decision observed in the checker demo.
    pub checker_demo_policy_decision: Decision,
    /// Per-run pass/fail flags.
    pub result_flags: BundleResultFlags,
    /// Artifact paths the bundle produced; never empty.
    pub artifacts: Vec<String>,
    /// Overall bundle verdict.
    pub bundle_status: Gate,
}

/// Errors raised when a bundle summary fails validation.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Artifact list is empty.
    #[error("artifacts must be a non-empty array")]
    NoArtifacts,
    /// An artifact entry is empty.
    #[error("artifacts[{index}] must be a non-empty string")]
    EmptyArtifact {
        /// Offending entry index.
        index: usize,
    },
}

impl DemoBundleSummary {
    /// Validates the bundle summary beyond its serde shape.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError`] describing the first violation found.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.artifacts.is_empty() {
            return Err(BundleError::NoArtifacts);
        }
        for (index, artifact) in self.artifacts.iter().enumerate() {
            if artifact.trim().is_empty() {
                return Err(BundleError::EmptyArtifact {
                    index,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DemoBundleSummary {
        DemoBundleSummary {
            flow_exit_code: 0,
            checker_exit_code: 1,
            proposal_flow_status: Decision::Pass,
            checker_demo_status: Decision::Fail,
            checker_demo_policy_decision: Decision::Fail,
            result_flags: BundleResultFlags {
                proposal_flow: Gate::Pass,
                checker_demo_expected_fail: Gate::Pass,
            },
            artifacts: vec!["artifacts/demo/run_summary.json".to_string()],
            bundle_status: Gate::Pass,
        }
    }

    #[test]
    fn valid_bundle_summary_passes() {
        sample().validate().expect("bundle summary must validate");
    }

    #[test]
    fn empty_artifact_list_is_rejected() {
        let mut summary = sample();
        summary.artifacts.clear();
        assert!(matches!(summary.validate(), Err(BundleError::NoArtifacts)));
    }

    #[test]
    fn blank_artifact_entry_is_rejected() {
        let mut summary = sample();
        summary.artifacts.push("  ".to_string());
        assert!(matches!(summary.validate(), Err(BundleError::EmptyArtifact { index: 1 })));
    }

    #[test]
    fn status_enums_reject_unknown_labels() {
        let raw = serde_json::json!({
            "flow_exit_code": 0,
            "checker_exit_code": 0,
            "proposal_flow_status": "MAYBE",
            "checker_demo_status": "FAIL",
            "checker_demo_policy_decision": "FAIL",
            "result_flags": {"proposal_flow": "PASS", "checker_demo_expected_fail": "PASS"},
            "artifacts": ["a.json"],
            "bundle_status": "PASS",
        });
        assert!(serde_json::from_value::<DemoBundleSummary>(raw).is_err());
    }
}
