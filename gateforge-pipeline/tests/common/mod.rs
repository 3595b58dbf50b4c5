// gateforge-pipeline/tests/common/mod.rs
// ============================================================================
// Module: Pipeline Test Fixtures
// Description: Shared workspace scaffolding for end-to-end pipeline tests.
// Purpose: Build a temp repository root with policies and baselines.
// Dependencies: gateforge-core, serde_json, tempfile
// ============================================================================

#![allow(dead_code, reason = "fixture helpers are shared across test binaries")]

use std::path::Path;
use std::path::PathBuf;

use gateforge_core::io::write_json_atomic;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

/// A scratch repository root with the standard layout seeded.
pub struct Workspace {
    /// Owning temp directory.
    pub dir: TempDir,
}

impl Workspace {
    /// Repository root path.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Joins a path under the root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Writes a JSON artifact under the root.
    pub fn write_json(&self, rel: &str, value: &Value) -> PathBuf {
        let path = self.path(rel);
        write_json_atomic(&path, value).expect("fixture write");
        path
    }
}

/// Builds a workspace with the default policy and a mock baseline.
pub fn workspace() -> Workspace {
    let ws = Workspace {
        dir: TempDir::new().expect("workspace tempdir"),
    };
    ws.write_json("policies/default_policy.json", &default_policy());
    ws.write_json("baselines/index.json", &baseline_index("baselines/mock_minimal.json"));
    ws.write_json("baselines/mock_minimal.json", &baseline_evidence("mock", 1.0, 12));
    ws
}

/// Default policy fixture mirroring policies/default_policy.json.
pub fn default_policy() -> Value {
    json!({
        "policy_version": "default-1",
        "critical_reasons": [
            "status_not_success",
            "gate_not_pass",
            "check_regression",
            "simulate_regression",
            "strict_schema_version_mismatch",
            "strict_backend_mismatch",
            "strict_model_script_mismatch",
            "strict_policy_version_mismatch",
            "baseline_missing",
            "change_apply_failed",
            "candidate_timeout_detected",
            "nan_or_inf_detected",
        ],
        "runtime_only_policy_by_risk": {
            "low": "PASS",
            "medium": "NEEDS_REVIEW",
            "high": "FAIL",
        },
        "reason_to_decision_by_risk": {
            "runtime_regression": {"low": "PASS", "medium": "NEEDS_REVIEW", "high": "NEEDS_REVIEW"},
            "performance_regression_detected": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "event_explosion_detected": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "steady_state_regression_detected": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "overshoot_regression_detected": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "settling_time_regression_detected": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "physical_invariant_range_violated": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "physical_invariant_monotonic_violated": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "physical_invariant_bounded_delta_violated": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "invariant_guard_metric_missing": {
                "low": "NEEDS_REVIEW", "medium": "NEEDS_REVIEW", "high": "FAIL",
            },
            "proposal_backend_mismatch_baseline": {"low": "FAIL", "medium": "FAIL", "high": "FAIL"},
            "proposal_backend_mismatch_candidate": {"low": "FAIL", "medium": "FAIL", "high": "FAIL"},
            "proposal_model_script_mismatch_baseline": {
                "low": "FAIL", "medium": "FAIL", "high": "FAIL",
            },
            "proposal_model_script_mismatch_candidate": {
                "low": "FAIL", "medium": "FAIL", "high": "FAIL",
            },
        },
        "required_human_checks": {
            "by_risk": {
                "low": ["Compare baseline/candidate evidence and attach justification."],
                "medium": [
                    "Compare baseline/candidate evidence and attach justification.",
                    "Confirm regression thresholds reflect the intended risk posture.",
                ],
                "high": [
                    "Compare baseline/candidate evidence and attach justification.",
                    "Confirm regression thresholds reflect the intended risk posture.",
                    "Pre-approve the rollback path.",
                ],
            },
        },
    })
}

/// Baseline index fixture for the mock minimal probe.
pub fn baseline_index(baseline_rel: &str) -> Value {
    json!({
        "entries": [
            {
                "backend": "mock",
                "model_script": "demos/openmodelica/minimal_probe.mos",
                "baseline": baseline_rel,
            },
        ],
    })
}

/// Valid evidence fixture with the given runtime and events.
pub fn baseline_evidence(backend: &str, runtime_seconds: f64, events: u64) -> Value {
    json!({
        "schema_version": "0.1.0",
        "run_id": format!("baseline-{backend}"),
        "timestamp_utc": "2026-01-01T00:00:00Z",
        "backend": backend,
        "model_script": "demos/openmodelica/minimal_probe.mos",
        "status": "success",
        "failure_type": "none",
        "gate": "PASS",
        "check_ok": true,
        "simulate_ok": true,
        "metrics": {"runtime_seconds": runtime_seconds, "events": events},
        "exit_code": 0,
        "toolchain": {},
        "artifacts": {"log_excerpt": "fixture baseline"},
    })
}

/// Proposal fixture targeting the mock minimal probe.
pub fn proposal(id: &str, risk: &str, actions: &[&str]) -> Value {
    json!({
        "schema_version": "0.1.0",
        "proposal_id": id,
        "timestamp_utc": "2026-01-01T00:00:00Z",
        "author_type": "human",
        "backend": "mock",
        "model_script": "demos/openmodelica/minimal_probe.mos",
        "change_summary": "fixture proposal",
        "requested_actions": actions,
        "risk_level": risk,
    })
}
