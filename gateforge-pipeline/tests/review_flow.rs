// gateforge-pipeline/tests/review_flow.rs
// ============================================================================
// Module: Review Resolution Flow Tests
// Description: End-to-end review resolution and ledger behavior.
// Purpose: Prove the ledger grows one line per resolution and filters hold.
// Dependencies: gateforge-core, gateforge-pipeline, tempfile
// ============================================================================
//! ## Overview
//! Resolves fabricated NEEDS_REVIEW summaries against human decisions and
//! checks the ledger and KPI surfaces.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use gateforge_core::RunStatus;
use gateforge_pipeline::review::LedgerFilter;
use gateforge_pipeline::review::LedgerRecord;
use gateforge_pipeline::review::export_ledger;
use gateforge_pipeline::review::load_ledger;
use gateforge_pipeline::review::resolve_review_files;
use serde_json::Value;
use serde_json::json;

fn source(ws: &common::Workspace, rel: &str, proposal_id: &str, risk: &str) -> std::path::PathBuf {
    ws.write_json(
        rel,
        &json!({
            "proposal_id": proposal_id,
            "status": "NEEDS_REVIEW",
            "policy_decision": "NEEDS_REVIEW",
            "risk_level": risk,
            "required_human_checks": ["Confirm the regression is acceptable."],
            "toolchain": {"policy_profile": "default_policy", "policy_version": "default-1"},
        }),
    )
}

fn review(
    ws: &common::Workspace,
    rel: &str,
    proposal_id: &str,
    decision: &str,
    second: Option<(&str, &str)>,
) -> std::path::PathBuf {
    let mut payload = json!({
        "schema_version": "0.1.0",
        "review_id": format!("rev-{proposal_id}"),
        "proposal_id": proposal_id,
        "reviewer": "alice",
        "decision": decision,
        "rationale": "reviewed metrics and logs",
        "all_required_checks_completed": true,
        "requested_at_utc": "2026-01-01T00:00:00Z",
        "reviewed_at_utc": "2026-01-01T00:20:00Z",
    });
    if let Some((reviewer, verdict)) = second {
        payload["second_reviewer"] = json!(reviewer);
        payload["second_decision"] = json!(verdict);
    }
    ws.write_json(rel, &payload)
}

// ============================================================================
// SECTION: S6 High-Risk Dual Review
// ============================================================================

/// High-risk approvals without a second approval stay in review; with one
/// they resolve to PASS.
#[test]
fn high_risk_resolution_requires_second_approval() {
    let ws = common::workspace();
    let ledger = ws.path("artifacts/review/ledger.jsonl");

    let summary = source(&ws, "artifacts/review/summary_a.json", "prop-hr", "high");
    let solo = review(&ws, "artifacts/review/review_a.json", "prop-hr", "approve", None);
    let resolution = resolve_review_files(
        &summary,
        &solo,
        &ws.path("artifacts/review/final_a.json"),
        None,
        &ledger,
    )
    .expect("resolve");
    assert_eq!(resolution.final_status, RunStatus::NeedsReview);
    assert_eq!(resolution.final_reasons, vec!["needs_second_reviewer"]);

    let dual = review(
        &ws,
        "artifacts/review/review_b.json",
        "prop-hr",
        "approve",
        Some(("bob", "approve")),
    );
    let resolution = resolve_review_files(
        &summary,
        &dual,
        &ws.path("artifacts/review/final_b.json"),
        None,
        &ledger,
    )
    .expect("resolve");
    assert_eq!(resolution.final_status, RunStatus::Pass);
}

// ============================================================================
// SECTION: Ledger Growth and Filters
// ============================================================================

/// N resolutions yield exactly N parseable ledger lines; filtered exports
/// contain only matching records.
#[test]
fn ledger_grows_one_line_per_resolution() {
    let ws = common::workspace();
    let ledger = ws.path("artifacts/review/ledger.jsonl");

    let outcomes = [
        ("prop-1", "approve", RunStatus::Pass),
        ("prop-2", "reject", RunStatus::Fail),
        ("prop-3", "approve", RunStatus::Pass),
    ];
    for (proposal_id, decision, expected) in outcomes {
        let summary = source(
            &ws,
            &format!("artifacts/review/{proposal_id}_summary.json"),
            proposal_id,
            "low",
        );
        let decision_file = review(
            &ws,
            &format!("artifacts/review/{proposal_id}_review.json"),
            proposal_id,
            decision,
            None,
        );
        let resolution = resolve_review_files(
            &summary,
            &decision_file,
            &ws.path(&format!("artifacts/review/{proposal_id}_final.json")),
            None,
            &ledger,
        )
        .expect("resolve");
        assert_eq!(resolution.final_status, expected);
    }

    let raw = std::fs::read_to_string(&ledger).expect("ledger file");
    assert_eq!(raw.lines().count(), 3);
    for line in raw.lines() {
        let record: LedgerRecord = serde_json::from_str(line).expect("ledger line parses");
        assert!(record.proposal_id.is_some());
        assert!(!record.recorded_at_utc.is_empty());
    }

    // Filtered export contains only matching records.
    let filter = LedgerFilter {
        final_status: Some(RunStatus::Fail),
        ..LedgerFilter::default()
    };
    let matched = load_ledger(&ledger, &filter).expect("filtered load");
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].proposal_id.as_deref(), Some("prop-2"));

    let export = ws.path("artifacts/review/failed.jsonl");
    export_ledger(&matched, &export).expect("export");
    let exported: Vec<Value> = std::fs::read_to_string(&export)
        .expect("export file")
        .lines()
        .map(|l| serde_json::from_str(l).expect("export line"))
        .collect();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0]["final_status"], json!("FAIL"));
}

/// Ledger records carry the policy and latency fields the KPIs need.
#[test]
fn ledger_records_carry_policy_and_latency_fields() {
    let ws = common::workspace();
    let ledger = ws.path("artifacts/review/ledger.jsonl");
    let summary = source(&ws, "artifacts/review/summary.json", "prop-kpi", "medium");
    let decision = review(&ws, "artifacts/review/review.json", "prop-kpi", "approve", None);
    resolve_review_files(
        &summary,
        &decision,
        &ws.path("artifacts/review/final.json"),
        None,
        &ledger,
    )
    .expect("resolve");

    let records = load_ledger(&ledger, &LedgerFilter::default()).expect("load");
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.policy_profile.as_deref(), Some("default_policy"));
    assert_eq!(record.policy_version.as_deref(), Some("default-1"));
    assert_eq!(record.resolution_seconds, Some(1200.0));
    assert_eq!(record.risk_level.as_deref(), Some("medium"));
    assert_eq!(record.required_human_checks_count, 1);
}
