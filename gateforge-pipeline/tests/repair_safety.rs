// gateforge-pipeline/tests/repair_safety.rs
// ============================================================================
// Module: Repair Loop and Batch Tests
// Description: Safety guard, retry budget, and batch ordering end-to-end.
// Purpose: Prove repairs cannot hide new critical failures.
// Dependencies: gateforge-core, gateforge-pipeline, tempfile
// ============================================================================
//! ## Overview
//! Exercises the repair loop against fabricated sources and a baseline index
//! that forces strict comparability failures on the rerun.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use gateforge_core::DeltaRelation;
use gateforge_core::RunStatus;
use gateforge_config::PolicySelection;
use gateforge_pipeline::batch::BatchOptions;
use gateforge_pipeline::batch::RepairCase;
use gateforge_pipeline::batch::RepairPack;
use gateforge_pipeline::batch::run_repair_batch;
use gateforge_pipeline::planner::PlannerBackend;
use gateforge_pipeline::repair::RepairRequest;
use gateforge_pipeline::repair::run_repair_loop;
use serde_json::json;

fn pass_source(ws: &common::Workspace, rel: &str) -> std::path::PathBuf {
    ws.write_json(
        rel,
        &json!({
            "proposal_id": "prop-src",
            "status": "PASS",
            "policy_decision": "PASS",
            "policy_reasons": [],
            "fail_reasons": [],
            "risk_level": "low",
        }),
    )
}

fn fail_source(ws: &common::Workspace, rel: &str) -> std::path::PathBuf {
    ws.write_json(
        rel,
        &json!({
            "proposal_id": "prop-src",
            "status": "FAIL",
            "policy_decision": "FAIL",
            "policy_reasons": ["gate_not_pass"],
            "fail_reasons": ["gate_not_pass"],
            "risk_level": "low",
        }),
    )
}

fn repair_request<'a>(
    ws: &'a common::Workspace,
    source: &'a std::path::Path,
    out: std::path::PathBuf,
    baseline_index: std::path::PathBuf,
) -> RepairRequest<'a> {
    RepairRequest {
        root: ws.root(),
        source_path: source,
        goal: None,
        planner_backend: PlannerBackend::Rule,
        strategy_profile: "default".to_string(),
        proposal_id: None,
        baseline: "auto".to_string(),
        baseline_index,
        runtime_threshold: 0.2,
        policy: PolicySelection::default(),
        max_retries: 1,
        retry_on_failed_attempt: true,
        retry_confidence_min: 0.8,
        block_new_reason_prefix: Some("strict_".to_string()),
        new_critical_reasons: Vec::new(),
        invariant_repair_profile: None,
        out_path: out,
        report_path: None,
    }
}

// ============================================================================
// SECTION: S3 Safety Guard
// ============================================================================

/// A repair that introduces a strict-comparability failure is forced to FAIL
/// by the safety guard.
#[test]
fn safety_guard_blocks_new_strict_reasons() {
    let ws = common::workspace();
    // The rerun compares the mock candidate against a baseline recorded on a
    // different backend, so strict_backend_mismatch appears as a new reason.
    ws.write_json(
        "baselines/mock_minimal.json",
        &common::baseline_evidence("openmodelica", 1.0, 12),
    );
    let source = pass_source(&ws, "artifacts/s3/source.json");
    let request = repair_request(
        &ws,
        &source,
        ws.path("artifacts/s3/repair_loop_summary.json"),
        ws.path("baselines/index.json"),
    );

    let summary = run_repair_loop(&request).expect("repair loop");
    assert!(summary.safety_guard_triggered);
    assert_eq!(summary.after.status, RunStatus::Fail);
    assert_eq!(summary.status, RunStatus::Fail);
    assert!(summary
        .after
        .reasons
        .iter()
        .any(|r| r.starts_with("repair_safety_new_critical_reason:strict_")));
    assert_eq!(summary.comparison.delta, DeltaRelation::Worse);
    // Retry budget: attempts never exceed max_retries + 1.
    assert!(!summary.attempts.is_empty());
    assert!(summary.attempts.len() <= 2);
}

/// A repair whose rerun is clean improves the failing source.
#[test]
fn clean_rerun_improves_failing_source() {
    let ws = common::workspace();
    let source = fail_source(&ws, "artifacts/clean/source.json");
    let mut request = repair_request(
        &ws,
        &source,
        ws.path("artifacts/clean/repair_loop_summary.json"),
        ws.path("baselines/index.json"),
    );
    request.block_new_reason_prefix = None;

    let summary = run_repair_loop(&request).expect("repair loop");
    assert_eq!(summary.status, RunStatus::Pass);
    assert!(!summary.safety_guard_triggered);
    assert_eq!(summary.comparison.delta, DeltaRelation::Improved);
    assert!(summary.comparison.score_after > summary.comparison.score_before);
    assert_eq!(summary.attempts.len(), 1);
    assert!(!summary.retry_used);
    assert!(summary.comparison.fixed_reasons.contains(&"gate_not_pass".to_string()));
}

/// Invariant reasons on the source flip the loop into the invariant branch.
#[test]
fn invariant_reasons_enter_invariant_branch() {
    let ws = common::workspace();
    let source = ws.write_json(
        "artifacts/inv/source.json",
        &json!({
            "proposal_id": "prop-inv",
            "status": "FAIL",
            "policy_decision": "FAIL",
            "policy_reasons": ["physical_invariant_range_violated:steady_state_error"],
            "fail_reasons": ["physical_invariant_range_violated:steady_state_error"],
            "risk_level": "medium",
        }),
    );
    let mut request = repair_request(
        &ws,
        &source,
        ws.path("artifacts/inv/repair_loop_summary.json"),
        ws.path("baselines/index.json"),
    );
    request.block_new_reason_prefix = None;

    let summary = run_repair_loop(&request).expect("repair loop");
    assert!(summary.invariant_repair_applied);
}

// ============================================================================
// SECTION: Batch Ordering and Determinism
// ============================================================================

fn three_case_pack(source: &std::path::Path) -> RepairPack {
    let case = |name: &str| RepairCase {
        name: Some(name.to_string()),
        source: source.display().to_string(),
        planner_backend: None,
        baseline: None,
        max_retries: Some(0),
        policy_profile: None,
        proposal_id: None,
        metadata: serde_json::Map::new(),
    };
    RepairPack {
        pack_id: "pack-determinism".to_string(),
        generated_from: None,
        cases: vec![case("c_alpha"), case("c_beta"), case("c_gamma")],
    }
}

/// Batch output order follows pack declaration order for every pool size,
/// and the per-case outcomes are identical across pool sizes.
#[test]
fn batch_results_are_deterministic_across_worker_pools() {
    let ws = common::workspace();
    let source = fail_source(&ws, "artifacts/batch/source.json");
    let pack = three_case_pack(&source);

    let mut outcomes = Vec::new();
    for workers in [1_usize, 4] {
        let out_dir = ws.path(&format!("artifacts/batch/w{workers}"));
        let summary_out = out_dir.join("summary.json");
        let options = BatchOptions {
            workers,
            baseline_index: ws.path("baselines/index.json"),
            policy: PolicySelection::default(),
            ..BatchOptions::default()
        };
        let summary =
            run_repair_batch(ws.root(), &pack, &out_dir, &summary_out, None, &options)
                .expect("batch");
        let names: Vec<String> = summary.cases.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["c_alpha", "c_beta", "c_gamma"], "workers={workers}");
        outcomes.push(
            summary
                .cases
                .iter()
                .map(|c| (c.name.clone(), c.status, c.delta, c.reasons.clone()))
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(outcomes[0], outcomes[1]);
}

/// Batch counters add up over the per-case rows.
#[test]
fn batch_counters_match_rows() {
    let ws = common::workspace();
    let source = fail_source(&ws, "artifacts/batch2/source.json");
    let pack = three_case_pack(&source);
    let out_dir = ws.path("artifacts/batch2/out");
    let options = BatchOptions {
        baseline_index: ws.path("baselines/index.json"),
        policy: PolicySelection::default(),
        ..BatchOptions::default()
    };
    let summary = run_repair_batch(
        ws.root(),
        &pack,
        &out_dir,
        &out_dir.join("summary.json"),
        None,
        &options,
    )
    .expect("batch");

    assert_eq!(summary.counts.total_cases, summary.cases.len());
    let pass = summary.cases.iter().filter(|c| c.status == RunStatus::Pass).count();
    let fail = summary.cases.iter().filter(|c| c.status == RunStatus::Fail).count();
    assert_eq!(summary.counts.pass_count, pass);
    assert_eq!(summary.counts.fail_count, fail);
    assert_eq!(
        summary.counts.improved_count
            + summary.counts.unchanged_count
            + summary.counts.worse_count,
        summary.counts.total_cases
    );
}
