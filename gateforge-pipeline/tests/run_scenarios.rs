// gateforge-pipeline/tests/run_scenarios.rs
// ============================================================================
// Module: Proposal Run Scenarios
// Description: End-to-end proposal runs through the orchestrator.
// Purpose: Cover the happy path, checker gating, and risk stratification.
// Dependencies: gateforge-core, gateforge-pipeline, tempfile
// ============================================================================
//! ## Overview
//! Drives complete proposals through validate -> smoke -> regress -> policy
//! and asserts against the JSON summaries.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use gateforge_core::Decision;
use gateforge_core::RunStatus;
use gateforge_core::io::read_json;
use gateforge_config::PolicySelection;
use gateforge_pipeline::run::RunRequest;
use gateforge_pipeline::run::run_proposal;
use serde_json::Value;
use serde_json::json;

fn run_request<'a>(
    ws: &'a common::Workspace,
    proposal: &'a std::path::Path,
    candidate_in: Option<&'a std::path::Path>,
    paths: &'a ScenarioPaths,
) -> RunRequest<'a> {
    RunRequest {
        root: ws.root(),
        proposal_path: proposal,
        out_path: &paths.out,
        report_path: None,
        candidate_out: &paths.candidate_out,
        candidate_in,
        regression_out: &paths.regression_out,
        baseline: "auto",
        baseline_index: &paths.baseline_index,
        runtime_threshold: 0.2,
        policy: PolicySelection::default(),
        dry_run: false,
        guardrail: None,
    }
}

struct ScenarioPaths {
    out: std::path::PathBuf,
    candidate_out: std::path::PathBuf,
    regression_out: std::path::PathBuf,
    baseline_index: std::path::PathBuf,
}

impl ScenarioPaths {
    fn new(ws: &common::Workspace, tag: &str) -> Self {
        Self {
            out: ws.path(&format!("artifacts/{tag}/run_summary.json")),
            candidate_out: ws.path(&format!("artifacts/{tag}/candidate.json")),
            regression_out: ws.path(&format!("artifacts/{tag}/regression.json")),
            baseline_index: ws.path("baselines/index.json"),
        }
    }
}

// ============================================================================
// SECTION: S1 Happy Path
// ============================================================================

/// A low-risk mock proposal against a matching baseline passes cleanly.
#[test]
fn happy_path_proposal_run_passes() {
    let ws = common::workspace();
    let proposal = ws.write_json(
        "artifacts/s1/proposal.json",
        &common::proposal("prop-s1", "low", &["check", "simulate", "regress"]),
    );
    let paths = ScenarioPaths::new(&ws, "s1");
    let request = run_request(&ws, &proposal, None, &paths);

    let summary = run_proposal(&request).expect("run");
    assert_eq!(summary.status, RunStatus::Pass);
    assert_eq!(summary.policy_decision, Decision::Pass);
    assert!(summary.fail_reasons.is_empty());
    assert!(summary.smoke_executed);
    assert!(summary.regress_executed);

    // Artifacts exist and cross-reference the proposal.
    let regression: Value = read_json(&paths.regression_out).expect("regression artifact");
    assert_eq!(regression["proposal_id"], json!("prop-s1"));
    assert_eq!(regression["decision"], json!("PASS"));
    let on_disk: Value = read_json(&paths.out).expect("summary artifact");
    assert_eq!(on_disk["proposal_id"], json!("prop-s1"));
}

// ============================================================================
// SECTION: S2 Checker Gate
// ============================================================================

/// Performance and event-explosion checkers push a medium-risk run into
/// review.
#[test]
fn checker_gate_needs_review_at_medium_risk() {
    let ws = common::workspace();
    ws.write_json(
        "baselines/mock_minimal.json",
        &common::baseline_evidence("mock", 1.0, 10),
    );
    let mut proposal = common::proposal("prop-s2", "medium", &["regress"]);
    proposal["checker_config"] = json!({
        "performance_regression": {"max_ratio": 1.5},
        "event_explosion": {"max_ratio": 1.5},
    });
    let proposal = ws.write_json("artifacts/s2/proposal.json", &proposal);

    let mut candidate = common::baseline_evidence("mock", 1.6, 16);
    candidate["run_id"] = json!("candidate-s2");
    let candidate = ws.write_json("artifacts/s2/candidate_in.json", &candidate);

    let paths = ScenarioPaths::new(&ws, "s2");
    let request = run_request(&ws, &proposal, Some(&candidate), &paths);

    let summary = run_proposal(&request).expect("run");
    assert_eq!(summary.status, RunStatus::NeedsReview);
    assert!(summary.fail_reasons.is_empty());
    assert!(!summary.required_human_checks.is_empty());

    let regression: Value = read_json(&paths.regression_out).expect("regression artifact");
    let reasons: Vec<String> = regression["reasons"]
        .as_array()
        .expect("reasons")
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    assert!(reasons.contains(&"performance_regression_detected".to_string()));
    assert!(reasons.contains(&"event_explosion_detected".to_string()));
    assert!(reasons.iter().any(|r| r.starts_with("runtime_regression:")));
}

// ============================================================================
// SECTION: S4 Invariant Risk Stratification
// ============================================================================

fn invariant_proposal(id: &str, risk: &str) -> Value {
    let mut proposal = common::proposal(id, risk, &["regress"]);
    proposal["physical_invariants"] = json!([
        {"type": "range", "metric": "steady_state_error", "min": 0.0, "max": 0.08},
        {"type": "monotonic", "metric": "energy", "direction": "non_increasing"},
        {"type": "bounded_delta", "metric": "overshoot", "max_delta": 0.1},
    ]);
    proposal
}

fn invariant_candidate() -> Value {
    let mut candidate = common::baseline_evidence("mock", 1.0, 12);
    candidate["run_id"] = json!("candidate-s4");
    candidate["metrics"] = json!({
        "runtime_seconds": 1.0,
        "events": 12,
        "steady_state_error": 0.15,
        "energy": 12.0,
        "overshoot": 0.30,
    });
    candidate
}

fn invariant_baseline() -> Value {
    let mut baseline = common::baseline_evidence("mock", 1.0, 12);
    baseline["metrics"] = json!({
        "runtime_seconds": 1.0,
        "events": 12,
        "steady_state_error": 0.02,
        "energy": 10.0,
        "overshoot": 0.05,
        "settling_time": 2.0,
    });
    baseline
}

/// The same invariant violations stay reviewable at medium risk and fail at
/// high risk.
#[test]
fn invariant_violations_stratify_by_risk() {
    for (risk, expected) in [("medium", RunStatus::NeedsReview), ("high", RunStatus::Fail)] {
        let ws = common::workspace();
        ws.write_json("baselines/mock_minimal.json", &invariant_baseline());
        let proposal = ws.write_json(
            &format!("artifacts/s4-{risk}/proposal.json"),
            &invariant_proposal(&format!("prop-s4-{risk}"), risk),
        );
        let candidate = ws.write_json(
            &format!("artifacts/s4-{risk}/candidate_in.json"),
            &invariant_candidate(),
        );
        let paths = ScenarioPaths::new(&ws, &format!("s4-{risk}"));
        let request = run_request(&ws, &proposal, Some(&candidate), &paths);

        let summary = run_proposal(&request).expect("run");
        assert_eq!(summary.status, expected, "risk={risk}");
        if expected == RunStatus::Fail {
            assert!(!summary.fail_reasons.is_empty());
        } else {
            assert!(summary.fail_reasons.is_empty());
            assert!(!summary.required_human_checks.is_empty());
        }

        let regression: Value = read_json(&paths.regression_out).expect("regression artifact");
        let reasons: Vec<String> = regression["reasons"]
            .as_array()
            .expect("reasons")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        for expected_reason in [
            "physical_invariant_range_violated:steady_state_error",
            "physical_invariant_monotonic_violated:energy",
            "physical_invariant_bounded_delta_violated:overshoot",
        ] {
            assert!(reasons.contains(&expected_reason.to_string()), "missing {expected_reason}");
        }
    }
}

// ============================================================================
// SECTION: Round Trip
// ============================================================================

/// Re-running regress against the emitted candidate is idempotent.
#[test]
fn regress_round_trip_is_idempotent() {
    use gateforge_core::Evidence;
    use gateforge_core::RegressionOptions;
    use gateforge_core::compare_evidence;

    let ws = common::workspace();
    let proposal = ws.write_json(
        "artifacts/rt/proposal.json",
        &common::proposal("prop-rt", "low", &["check", "simulate", "regress"]),
    );
    let paths = ScenarioPaths::new(&ws, "rt");
    let request = run_request(&ws, &proposal, None, &paths);
    run_proposal(&request).expect("run");

    let baseline: Evidence =
        read_json(&ws.path("baselines/mock_minimal.json")).expect("baseline");
    let candidate: Evidence = read_json(&paths.candidate_out).expect("candidate");
    let options = RegressionOptions {
        strict: true,
        strict_model_script: true,
        ..RegressionOptions::default()
    };
    let first = compare_evidence(&baseline, &candidate, &options).expect("first");
    let second = compare_evidence(&baseline, &candidate, &options).expect("second");
    assert_eq!(first.decision, second.decision);
    assert_eq!(first.reasons, second.reasons);
}

// ============================================================================
// SECTION: Baseline Miss
// ============================================================================

/// Auto resolution against an index without a matching entry aborts.
#[test]
fn baseline_miss_aborts_before_output() {
    let ws = common::workspace();
    ws.write_json("baselines/index.json", &json!({"entries": []}));
    let proposal = ws.write_json(
        "artifacts/miss/proposal.json",
        &common::proposal("prop-miss", "low", &["check", "simulate", "regress"]),
    );
    let paths = ScenarioPaths::new(&ws, "miss");
    let request = run_request(&ws, &proposal, None, &paths);
    let err = run_proposal(&request).expect_err("must abort");
    assert!(err.to_string().contains("baseline_not_found"));
    assert!(!paths.out.exists());
}
