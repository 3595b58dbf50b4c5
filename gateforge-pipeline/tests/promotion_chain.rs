// gateforge-pipeline/tests/promotion_chain.rs
// ============================================================================
// Module: Promotion Chain Tests
// Description: Promote -> compare -> apply end-to-end behavior.
// Purpose: Prove ranking, margins, strict guards, and the audit trail.
// Dependencies: gateforge-core, gateforge-pipeline, tempfile
// ============================================================================
//! ## Overview
//! Builds governance snapshots and promotion profiles on disk, runs the full
//! chain, and asserts the ranking and guard invariants.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use gateforge_core::Decision;
use gateforge_core::RunStatus;
use gateforge_core::io::read_jsonl;
use gateforge_core::io::write_json_atomic;
use gateforge_pipeline::promote::ApplyAction;
use gateforge_pipeline::promote::ApplyGuards;
use gateforge_pipeline::promote::CompareSummary;
use gateforge_pipeline::promote::apply_promotion;
use gateforge_pipeline::promote::compare_promotion_profiles;
use gateforge_pipeline::promote::promote_snapshot;
use serde_json::Value;
use serde_json::json;

fn seed_profiles(ws: &common::Workspace) {
    ws.write_json(
        "policies/promotion/default.json",
        &json!({
            "require_status": ["PASS"],
            "require_kpi_floors": {},
            "require_no_risks": ["ci_matrix_failed"],
        }),
    );
    ws.write_json(
        "policies/promotion/industrial_strict.json",
        &json!({
            "require_status": ["PASS"],
            "require_kpi_floors": {"review_recovery_rate": 0.9},
            "require_no_risks": ["ci_matrix_failed", "strict_non_pass_rate_high"],
        }),
    );
}

fn seed_snapshot(ws: &common::Workspace) -> std::path::PathBuf {
    ws.write_json(
        "artifacts/snapshot.json",
        &json!({
            "status": "PASS",
            "kpis": {
                "review_recovery_rate": 0.8,
                "fail_rate": 0.1,
                "recommended_profile": "default",
            },
            "risks": [],
            "sources": {},
        }),
    )
}

// ============================================================================
// SECTION: Promote
// ============================================================================

/// A PASS snapshot promotes under the default profile.
#[test]
fn pass_snapshot_promotes_under_default_profile() {
    let ws = common::workspace();
    seed_profiles(&ws);
    let snapshot = seed_snapshot(&ws);
    let decision = promote_snapshot(
        ws.root(),
        &snapshot,
        Some("default"),
        None,
        None,
        &ws.path("artifacts/promote/default.json"),
        None,
    )
    .expect("promote");
    assert_eq!(decision.decision, Decision::Pass);
    assert!(decision.reasons.is_empty());
}

// ============================================================================
// SECTION: Compare Ranking
// ============================================================================

/// The winner's score dominates, the margin is winner minus runner-up, and
/// the recommended profile leads the ranking when its score is maximal.
#[test]
fn compare_ranks_profiles_and_reports_margin() {
    let ws = common::workspace();
    seed_profiles(&ws);
    let snapshot = seed_snapshot(&ws);
    let profiles = vec!["default".to_string(), "industrial_strict".to_string()];
    let summary = compare_promotion_profiles(
        ws.root(),
        &snapshot,
        &profiles,
        None,
        &ws.path("artifacts/compare"),
        &ws.path("artifacts/compare/summary.json"),
        None,
    )
    .expect("compare");

    assert_eq!(summary.status, Decision::Pass);
    assert_eq!(summary.best_profile.as_deref(), Some("default"));
    assert_eq!(summary.best_decision, Decision::Pass);
    // default: 100 + 10 - 0 + 5 = 115; strict (one floor violation): 50 + 10 - 1 = 59.
    assert_eq!(summary.best_total_score, 115);
    assert_eq!(summary.top_score_margin, 115 - 59);

    // Winner dominates every other row, and ranks are consistent.
    for row in &summary.ranking[1..] {
        assert!(summary.best_total_score >= row.total_score);
    }
    assert_eq!(summary.ranking[0].rank, 1);
    assert_eq!(summary.ranking[0].profile, "default");
    assert!(summary.ranking[0].is_recommended);

    // Pairwise explanations cover every challenger with consistent margins.
    let rows = &summary.decision_explanations.best_vs_others;
    assert_eq!(rows.len(), profiles.len() - 1);
    for row in rows {
        assert_eq!(row.score_margin, row.winner_total_score - row.challenger_total_score);
        assert!(!row.winner_advantages.is_empty());
    }
    assert_eq!(summary.explanation_quality.score, 100);
    assert_eq!(
        summary.decision_explanations.selection_priority.last().map(String::as_str),
        Some("recommended_profile_tiebreak")
    );
}

// ============================================================================
// SECTION: S5 Apply Guards
// ============================================================================

/// The explanation guard fails a PASS compare summary whose explanation
/// block is empty, and passes once explanations are present.
#[test]
fn apply_requires_ranking_explanation_when_asked() {
    let ws = common::workspace();
    seed_profiles(&ws);
    let snapshot = seed_snapshot(&ws);

    // A real compare summary, then strip its explanations.
    let compare_out = ws.path("artifacts/compare/summary.json");
    let summary = compare_promotion_profiles(
        ws.root(),
        &snapshot,
        &["default".to_string(), "industrial_strict".to_string()],
        None,
        &ws.path("artifacts/compare"),
        &compare_out,
        None,
    )
    .expect("compare");
    let mut stripped: CompareSummary = summary.clone();
    stripped.decision_explanations.best_vs_others.clear();
    let stripped_path = ws.path("artifacts/compare/stripped.json");
    write_json_atomic(&stripped_path, &stripped).expect("stripped summary");

    let guards = ApplyGuards {
        require_ranking_explanation: true,
        ..ApplyGuards::default()
    };
    let audit = ws.path("artifacts/apply/decision_audit.jsonl");
    let blocked = apply_promotion(
        &stripped_path,
        None,
        "governance.bot",
        &guards,
        &ws.path("artifacts/apply/blocked.json"),
        None,
        &audit,
    )
    .expect("apply");
    assert_eq!(blocked.final_status, RunStatus::Fail);
    assert_eq!(blocked.apply_action, ApplyAction::Block);
    assert_eq!(blocked.reasons, vec!["ranking_explanation_required"]);

    let promoted = apply_promotion(
        &compare_out,
        None,
        "governance.bot",
        &guards,
        &ws.path("artifacts/apply/promoted.json"),
        None,
        &audit,
    )
    .expect("apply");
    assert_eq!(promoted.final_status, RunStatus::Pass);
    assert_eq!(promoted.apply_action, ApplyAction::Promote);

    // Every apply invocation appended one audit row.
    let rows: Vec<Value> = read_jsonl(&audit).expect("audit rows");
    assert_eq!(rows.len(), 2);
}

/// Margin and ticket guards fail with their stated reasons.
#[test]
fn apply_margin_and_ticket_guards() {
    let ws = common::workspace();
    seed_profiles(&ws);
    let snapshot = seed_snapshot(&ws);
    let compare_out = ws.path("artifacts/compare/summary.json");
    let summary = compare_promotion_profiles(
        ws.root(),
        &snapshot,
        &["default".to_string(), "industrial_strict".to_string()],
        None,
        &ws.path("artifacts/compare"),
        &compare_out,
        None,
    )
    .expect("compare");
    let audit = ws.path("artifacts/apply/decision_audit.jsonl");

    // Margin floor above the observed margin blocks promotion.
    let guards = ApplyGuards {
        require_min_top_score_margin: Some(summary.top_score_margin + 1),
        ..ApplyGuards::default()
    };
    let blocked = apply_promotion(
        &compare_out,
        None,
        "governance.bot",
        &guards,
        &ws.path("artifacts/apply/margin.json"),
        None,
        &audit,
    )
    .expect("apply");
    assert_eq!(blocked.final_status, RunStatus::Fail);
    assert_eq!(blocked.reasons, vec!["top_score_margin_below_min"]);

    // A NEEDS_REVIEW compare summary needs a ticket to hold for review.
    let mut review_summary = summary.clone();
    review_summary.status = Decision::NeedsReview;
    review_summary.best_decision = Decision::NeedsReview;
    let review_path = ws.path("artifacts/compare/review.json");
    write_json_atomic(&review_path, &review_summary).expect("review summary");

    let no_ticket = apply_promotion(
        &review_path,
        None,
        "governance.bot",
        &ApplyGuards::default(),
        &ws.path("artifacts/apply/no_ticket.json"),
        None,
        &audit,
    )
    .expect("apply");
    assert_eq!(no_ticket.final_status, RunStatus::Fail);
    assert_eq!(no_ticket.reasons, vec!["needs_review_ticket_required"]);

    let held = apply_promotion(
        &review_path,
        Some("TICKET-42"),
        "governance.bot",
        &ApplyGuards::default(),
        &ws.path("artifacts/apply/held.json"),
        None,
        &audit,
    )
    .expect("apply");
    assert_eq!(held.final_status, RunStatus::NeedsReview);
    assert_eq!(held.apply_action, ApplyAction::HoldForReview);
    assert_eq!(held.review_ticket_id.as_deref(), Some("TICKET-42"));
}
