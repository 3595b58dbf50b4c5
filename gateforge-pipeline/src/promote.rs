// gateforge-pipeline/src/promote.rs
// ============================================================================
// Module: GateForge Promotion Chain
// Description: Promote, scored profile compare, and apply with audit log.
// Purpose: Decide release eligibility of governance snapshots.
// Dependencies: gateforge-core, gateforge-config, chrono, serde
// ============================================================================

//! ## Overview
//! The promotion chain has three stages. `promote` gates one snapshot with a
//! promotion profile (required statuses, KPI floors, blocked risks) plus an
//! expirable human override. `compare` promotes the snapshot under several
//! profiles and ranks them by a component score: decision (PASS 100 /
//! NEEDS_REVIEW 50 / FAIL 0), a +10 clean-exit bonus, −1 per reason, and a
//! +5 bonus for the snapshot's recommended profile; ties break on
//! total_score, then decision, then exit code, then the recommended-profile
//! tiebreak. `apply` maps the best decision onto promote / hold_for_review /
//! block, enforces the strict explanation and margin guards, and appends one
//! row to the decision audit log per invocation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use gateforge_core::Decision;
use gateforge_core::JsonlLedger;
use gateforge_core::RunStatus;
use gateforge_core::io::read_json;
use gateforge_core::io::write_json_atomic;
use gateforge_core::io::write_text;
use gateforge_config::PromotionOverride;
use gateforge_config::PromotionProfile;
use gateforge_config::load_promotion_profile;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::backend::default_md_path;
use crate::error::PipelineError;
use crate::governance::GovernanceSnapshot;
use crate::report;

// ============================================================================
// SECTION: Scoring Constants
// ============================================================================

/// Score for a PASS promote decision.
const DECISION_SCORE_PASS: i64 = 100;
/// Score for a NEEDS_REVIEW promote decision.
const DECISION_SCORE_NEEDS_REVIEW: i64 = 50;
/// Score for a FAIL promote decision.
const DECISION_SCORE_FAIL: i64 = 0;
/// Bonus for a zero exit code.
const EXIT_OK_BONUS: i64 = 10;
/// Penalty per promote reason.
const REASON_PENALTY: i64 = 1;
/// Bonus for matching the snapshot's recommended profile.
const RECOMMENDED_BONUS: i64 = 5;

const fn decision_component(decision: Decision) -> i64 {
    match decision {
        Decision::Pass => DECISION_SCORE_PASS,
        Decision::NeedsReview => DECISION_SCORE_NEEDS_REVIEW,
        Decision::Fail => DECISION_SCORE_FAIL,
    }
}

// ============================================================================
// SECTION: Promote
// ============================================================================

/// One promote-stage decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoteDecision {
    /// Promote decision.
    pub decision: Decision,
    /// Snapshot status label.
    pub status: String,
    /// Reasons behind a non-PASS decision.
    pub reasons: Vec<String>,
    /// Profile name used.
    pub profile: String,
    /// Resolved profile path.
    pub profile_path: String,
    /// Snapshot path.
    pub snapshot_path: String,
    /// Numeric signals consulted by the gates.
    pub signals: BTreeMap<String, f64>,
    /// Whether an override changed the decision.
    pub override_applied: bool,
    /// Whether an override was present and unexpired.
    pub override_active: bool,
    /// Override disposition, when an override file was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
}

/// Evaluates a promotion profile against a snapshot.
#[must_use]
pub fn evaluate_promotion(
    snapshot: &GovernanceSnapshot,
    profile: &PromotionProfile,
    override_file: Option<&PromotionOverride>,
    now: DateTime<Utc>,
) -> (Decision, Vec<String>, bool, bool, Option<String>) {
    let status_label = snapshot.status.as_str();
    let mut fail_reasons: Vec<String> = Vec::new();
    let mut review_reasons: Vec<String> = Vec::new();

    if !profile.require_status.is_empty()
        && !profile.require_status.iter().any(|s| s == status_label)
    {
        if snapshot.status == Decision::NeedsReview && profile.allow_promote_even_if_needs_review
        {
            review_reasons.push(format!("status_requires_review:{status_label}"));
        } else {
            fail_reasons.push(format!("status_denied:{status_label}"));
        }
    }

    for risk in &snapshot.risks {
        if profile.require_no_risks.iter().any(|blocked| blocked == risk) {
            fail_reasons.push(format!("blocked_risk:{risk}"));
        }
    }

    for (kpi, floor) in &profile.require_kpi_floors {
        let Some(floor) = floor.as_f64() else {
            continue;
        };
        match kpi_value(snapshot, kpi) {
            Some(value) if value < floor => {
                review_reasons.push(format!("kpi_below_floor:{kpi}:{value:.4}<{floor:.4}"));
            }
            Some(_) => {}
            None => review_reasons.push(format!("kpi_missing:{kpi}")),
        }
    }

    let mut decision = if !fail_reasons.is_empty() {
        Decision::Fail
    } else if !review_reasons.is_empty() {
        Decision::NeedsReview
    } else {
        Decision::Pass
    };
    let mut reasons = if !fail_reasons.is_empty() { fail_reasons } else { review_reasons };

    let mut override_applied = false;
    let mut override_active = false;
    let mut override_reason = None;
    if let Some(override_file) = override_file {
        if override_file.is_expired(now) {
            override_reason = Some("override_expired".to_string());
        } else {
            override_active = true;
            if override_file.allow_promote && decision != Decision::Pass {
                decision = Decision::Pass;
                let why = override_file
                    .reason
                    .clone()
                    .unwrap_or_else(|| "override_applied".to_string());
                reasons = vec![format!("override_allow_promote:{why}")];
                override_applied = true;
                override_reason = Some(why);
            } else {
                override_reason = Some("override_present_no_effect".to_string());
            }
        }
    }

    (decision, reasons, override_applied, override_active, override_reason)
}

fn kpi_value(snapshot: &GovernanceSnapshot, name: &str) -> Option<f64> {
    match name {
        "strict_downgrade_rate" => snapshot.kpis.strict_downgrade_rate,
        "review_recovery_rate" => snapshot.kpis.review_recovery_rate,
        "strict_non_pass_rate" => snapshot.kpis.strict_non_pass_rate,
        "approval_rate" => snapshot.kpis.approval_rate,
        "fail_rate" => snapshot.kpis.fail_rate,
        _ => None,
    }
}

/// Promotes a snapshot under a profile and writes the decision artifact.
///
/// # Errors
///
/// Returns [`PipelineError`] on input or write failure.
pub fn promote_snapshot(
    root: &Path,
    snapshot_path: &Path,
    profile: Option<&str>,
    profile_path: Option<&Path>,
    override_path: Option<&Path>,
    out_path: &Path,
    report_path: Option<&Path>,
) -> Result<PromoteDecision, PipelineError> {
    let (profile_file, resolved_profile_path) =
        load_promotion_profile(profile, profile_path, root)?;
    let snapshot: GovernanceSnapshot = read_json(snapshot_path)?;
    let override_file: Option<PromotionOverride> = match override_path {
        Some(path) => Some(read_json(path)?),
        None => None,
    };

    let (decision, reasons, override_applied, override_active, override_reason) =
        evaluate_promotion(&snapshot, &profile_file, override_file.as_ref(), Utc::now());

    let mut signals = BTreeMap::new();
    for name in [
        "strict_downgrade_rate",
        "review_recovery_rate",
        "strict_non_pass_rate",
        "approval_rate",
        "fail_rate",
    ] {
        if let Some(value) = kpi_value(&snapshot, name) {
            signals.insert(name.to_string(), value);
        }
    }

    let profile_name = profile
        .map(str::to_string)
        .or_else(|| {
            resolved_profile_path.file_stem().map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "default".to_string());

    let result = PromoteDecision {
        decision,
        status: snapshot.status.as_str().to_string(),
        reasons,
        profile: profile_name,
        profile_path: resolved_profile_path.display().to_string(),
        snapshot_path: snapshot_path.display().to_string(),
        signals,
        override_applied,
        override_active,
        override_reason,
    };
    write_json_atomic(out_path, &result)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::promote_markdown(&result))?;
    Ok(result)
}

// ============================================================================
// SECTION: Compare
// ============================================================================

/// One ranked profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedProfile {
    /// Profile name.
    pub profile: String,
    /// Promote decision under the profile.
    pub decision: Decision,
    /// Exit code the promote stage would report (0 unless FAIL).
    pub exit_code: i64,
    /// Promote reasons under the profile.
    pub reasons: Vec<String>,
    /// Decision score component.
    pub decision_component: i64,
    /// Exit-code bonus component.
    pub exit_component: i64,
    /// Reason-count penalty component.
    pub reasons_component: i64,
    /// Recommended-profile bonus component.
    pub recommended_component: i64,
    /// Total score.
    pub total_score: i64,
    /// Whether this profile is the snapshot's recommended profile.
    pub is_recommended: bool,
    /// 1-based rank after sorting.
    pub rank: usize,
}

/// One pairwise explanation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestVsOther {
    /// Winning profile.
    pub winner_profile: String,
    /// Challenger profile.
    pub challenger_profile: String,
    /// Winner total score.
    pub winner_total_score: i64,
    /// Challenger total score.
    pub challenger_total_score: i64,
    /// Winner minus challenger.
    pub score_margin: i64,
    /// Whether the totals tied.
    pub tie_on_total_score: bool,
    /// Components favoring the winner.
    pub winner_advantages: Vec<String>,
}

/// Explanation block for the ranking decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionExplanations {
    /// Ordered tiebreak criteria.
    pub selection_priority: Vec<String>,
    /// Pairwise winner-vs-challenger rows.
    pub best_vs_others: Vec<BestVsOther>,
}

/// Explanation quality assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationQuality {
    /// Rounded percent of passing checks.
    pub score: u32,
    /// Individual check outcomes.
    pub checks: BTreeMap<String, bool>,
}

/// Promotion compare summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareSummary {
    /// Fused compare status.
    pub status: Decision,
    /// Snapshot path.
    pub snapshot_path: String,
    /// Profiles compared, in declaration order.
    pub profiles: Vec<String>,
    /// Snapshot's recommended profile, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_profile: Option<String>,
    /// Winning profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_profile: Option<String>,
    /// Winning decision.
    pub best_decision: Decision,
    /// Winning total score.
    pub best_total_score: i64,
    /// Winner minus runner-up total score.
    pub top_score_margin: i64,
    /// Configured margin floor, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_top_score_margin: Option<i64>,
    /// Ranked rows ordered by score then declared order.
    pub ranking: Vec<RankedProfile>,
    /// Decision explanations.
    pub decision_explanations: DecisionExplanations,
    /// Explanation quality assessment.
    pub explanation_quality: ExplanationQuality,
}

/// Compares promotion profiles on one snapshot.
///
/// # Errors
///
/// Returns [`PipelineError`] on input or write failure.
pub fn compare_promotion_profiles(
    root: &Path,
    snapshot_path: &Path,
    profiles: &[String],
    min_top_score_margin: Option<i64>,
    out_dir: &Path,
    out_path: &Path,
    report_path: Option<&Path>,
) -> Result<CompareSummary, PipelineError> {
    if profiles.is_empty() {
        return Err(PipelineError::Input("at least one profile is required".to_string()));
    }
    let snapshot: GovernanceSnapshot = read_json(snapshot_path)?;
    let recommended = snapshot.kpis.recommended_profile.clone();

    let mut rows: Vec<RankedProfile> = Vec::new();
    for name in profiles {
        let profile_out = out_dir.join(format!("{name}.json"));
        let (decision, reasons) = match promote_snapshot(
            root,
            snapshot_path,
            Some(name),
            None,
            None,
            &profile_out,
            None,
        ) {
            Ok(result) => (result.decision, result.reasons),
            Err(err) => (Decision::Fail, vec![format!("promotion_profile_error:{err}")]),
        };
        let exit_code = i64::from(decision == Decision::Fail);
        let is_recommended = recommended.as_deref() == Some(name.as_str());
        let decision_part = decision_component(decision);
        let exit_part = if exit_code == 0 { EXIT_OK_BONUS } else { 0 };
        let reasons_part = -(reasons.len() as i64) * REASON_PENALTY;
        let recommended_part = if is_recommended { RECOMMENDED_BONUS } else { 0 };
        rows.push(RankedProfile {
            profile: name.clone(),
            decision,
            exit_code,
            reasons,
            decision_component: decision_part,
            exit_component: exit_part,
            reasons_component: reasons_part,
            recommended_component: recommended_part,
            total_score: decision_part + exit_part + reasons_part + recommended_part,
            is_recommended,
            rank: 0,
        });
    }

    // Stable sort keeps declared order among full ties.
    rows.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| b.decision.score().cmp(&a.decision.score()))
            .then_with(|| a.exit_code.cmp(&b.exit_code))
            .then_with(|| b.is_recommended.cmp(&a.is_recommended))
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }

    let best = rows[0].clone();
    let second_score = rows.get(1).map_or(best.total_score, |r| r.total_score);
    let top_score_margin = best.total_score - second_score;

    let best_vs_others: Vec<BestVsOther> = rows[1..]
        .iter()
        .map(|challenger| BestVsOther {
            winner_profile: best.profile.clone(),
            challenger_profile: challenger.profile.clone(),
            winner_total_score: best.total_score,
            challenger_total_score: challenger.total_score,
            score_margin: best.total_score - challenger.total_score,
            tie_on_total_score: best.total_score == challenger.total_score,
            winner_advantages: advantages(&best, challenger),
        })
        .collect();

    let explanations = DecisionExplanations {
        selection_priority: vec![
            "total_score".to_string(),
            "decision".to_string(),
            "exit_code".to_string(),
            "recommended_profile_tiebreak".to_string(),
        ],
        best_vs_others,
    };
    let explanation_quality = assess_explanations(&explanations, rows.len());

    let status = if rows.iter().all(|r| r.decision == Decision::Fail) {
        Decision::Fail
    } else if best.decision == Decision::NeedsReview {
        Decision::NeedsReview
    } else {
        Decision::Pass
    };

    let summary = CompareSummary {
        status,
        snapshot_path: snapshot_path.display().to_string(),
        profiles: profiles.to_vec(),
        recommended_profile: recommended,
        best_profile: Some(best.profile.clone()),
        best_decision: best.decision,
        best_total_score: best.total_score,
        top_score_margin,
        min_top_score_margin,
        ranking: rows,
        decision_explanations: explanations,
        explanation_quality,
    };
    write_json_atomic(out_path, &summary)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::compare_markdown(&summary))?;
    Ok(summary)
}

fn advantages(winner: &RankedProfile, challenger: &RankedProfile) -> Vec<String> {
    let mut out = Vec::new();
    if winner.decision_component > challenger.decision_component {
        out.push("decision".to_string());
    }
    if winner.exit_component > challenger.exit_component {
        out.push("exit_code".to_string());
    }
    if winner.reasons_component > challenger.reasons_component {
        out.push("reasons".to_string());
    }
    if winner.recommended_component > challenger.recommended_component {
        out.push("recommended_profile".to_string());
    }
    out
}

fn assess_explanations(
    explanations: &DecisionExplanations,
    profile_count: usize,
) -> ExplanationQuality {
    let mut checks = BTreeMap::new();
    checks.insert(
        "has_selection_priority".to_string(),
        !explanations.selection_priority.is_empty(),
    );
    checks.insert(
        "has_best_vs_others".to_string(),
        profile_count < 2 || !explanations.best_vs_others.is_empty(),
    );
    checks.insert(
        "covers_all_challengers".to_string(),
        explanations.best_vs_others.len() == profile_count.saturating_sub(1),
    );
    checks.insert(
        "margins_consistent".to_string(),
        explanations
            .best_vs_others
            .iter()
            .all(|row| row.score_margin == row.winner_total_score - row.challenger_total_score),
    );
    let passing = checks.values().filter(|v| **v).count();
    let score = ((passing as f64 / checks.len() as f64) * 100.0).round() as u32;
    ExplanationQuality {
        score,
        checks,
    }
}

// ============================================================================
// SECTION: Apply
// ============================================================================

/// Action taken when applying a promotion decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    /// Promote the snapshot.
    Promote,
    /// Hold for human review under a ticket.
    HoldForReview,
    /// Block promotion.
    Block,
}

/// Strict guards applied at the apply stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ApplyGuards {
    /// Require a populated ranking explanation block.
    pub require_ranking_explanation: bool,
    /// Require the top score margin to reach this floor.
    pub require_min_top_score_margin: Option<i64>,
    /// Require the explanation quality score to reach this floor.
    pub require_min_explanation_quality: Option<u32>,
}

/// Apply-stage record and artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplySummary {
    /// Final status after applying.
    pub final_status: RunStatus,
    /// Action taken.
    pub apply_action: ApplyAction,
    /// Reasons behind a non-promote outcome.
    pub reasons: Vec<String>,
    /// Actor identity recorded in the audit log.
    pub actor: String,
    /// Review ticket, when holding for review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_ticket_id: Option<String>,
    /// Whether the explanation guard was active.
    pub require_ranking_explanation: bool,
    /// Margin floor, when the margin guard was active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_min_top_score_margin: Option<i64>,
    /// Quality floor, when the quality guard was active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_min_explanation_quality: Option<u32>,
    /// Compare summary status.
    pub compare_status: Decision,
    /// Winning profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_profile: Option<String>,
    /// Winning decision.
    pub best_decision: Decision,
    /// Snapshot's recommended profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_profile: Option<String>,
    /// Top score margin from the compare stage.
    pub top_score_margin: i64,
    /// Margin floor echoed from the compare stage, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_top_score_margin: Option<i64>,
    /// Explanation quality score from the compare stage.
    pub explanation_quality_score: u32,
    /// Ordered tiebreak criteria from the compare stage.
    pub ranking_selection_priority: Vec<String>,
    /// Pairwise explanation rows from the compare stage.
    pub ranking_best_vs_others: Vec<BestVsOther>,
    /// Compare summary path.
    pub compare_summary_path: String,
    /// UTC timestamp of the apply decision.
    pub recorded_at_utc: String,
    /// Audit log path.
    pub audit_path: String,
}

/// Applies a promotion compare summary.
///
/// Every invocation appends one row to the decision audit log, whatever the
/// outcome.
///
/// # Errors
///
/// Returns [`PipelineError`] on input or write failure.
pub fn apply_promotion(
    compare_summary_path: &Path,
    review_ticket_id: Option<&str>,
    actor: &str,
    guards: &ApplyGuards,
    out_path: &Path,
    report_path: Option<&Path>,
    audit_path: &Path,
) -> Result<ApplySummary, PipelineError> {
    let compare: CompareSummary = read_json(compare_summary_path)?;

    let mut reasons: Vec<String> = Vec::new();
    let (final_status, apply_action) = match compare.status {
        Decision::Fail => {
            reasons.push("compare_status_fail".to_string());
            (RunStatus::Fail, ApplyAction::Block)
        }
        Decision::NeedsReview => {
            if review_ticket_id.is_some_and(|t| !t.trim().is_empty()) {
                (RunStatus::NeedsReview, ApplyAction::HoldForReview)
            } else {
                reasons.push("needs_review_ticket_required".to_string());
                (RunStatus::Fail, ApplyAction::Block)
            }
        }
        Decision::Pass => {
            if guards.require_ranking_explanation
                && !valid_explanations(&compare.decision_explanations)
            {
                reasons.push("ranking_explanation_required".to_string());
            }
            if let Some(min) = guards.require_min_top_score_margin {
                if compare.top_score_margin < min {
                    reasons.push("top_score_margin_below_min".to_string());
                }
            }
            if let Some(min) = guards.require_min_explanation_quality {
                if compare.explanation_quality.score < min {
                    reasons.push("explanation_quality_below_min".to_string());
                }
            }
            if compare.best_profile.as_deref().map_or(true, |p| p.trim().is_empty()) {
                reasons.push("best_profile_missing".to_string());
            }
            if reasons.is_empty() {
                (RunStatus::Pass, ApplyAction::Promote)
            } else {
                (RunStatus::Fail, ApplyAction::Block)
            }
        }
    };

    let summary = ApplySummary {
        final_status,
        apply_action,
        reasons,
        actor: actor.to_string(),
        review_ticket_id: review_ticket_id.map(str::to_string),
        require_ranking_explanation: guards.require_ranking_explanation,
        require_min_top_score_margin: guards.require_min_top_score_margin,
        require_min_explanation_quality: guards.require_min_explanation_quality,
        compare_status: compare.status,
        best_profile: compare.best_profile.clone(),
        best_decision: compare.best_decision,
        recommended_profile: compare.recommended_profile.clone(),
        top_score_margin: compare.top_score_margin,
        min_top_score_margin: compare.min_top_score_margin,
        explanation_quality_score: compare.explanation_quality.score,
        ranking_selection_priority: compare.decision_explanations.selection_priority.clone(),
        ranking_best_vs_others: compare.decision_explanations.best_vs_others.clone(),
        compare_summary_path: compare_summary_path.display().to_string(),
        recorded_at_utc: Utc::now().to_rfc3339(),
        audit_path: audit_path.display().to_string(),
    };

    write_json_atomic(out_path, &summary)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::apply_markdown(&summary))?;

    let audit = JsonlLedger::open(audit_path)?;
    audit.append(&summary)?;
    tracing::info!(
        final_status = %summary.final_status,
        action = ?summary.apply_action,
        "promotion apply recorded"
    );
    Ok(summary)
}

/// A valid explanation block carries pairwise rows with named profiles and
/// integer margins.
fn valid_explanations(explanations: &DecisionExplanations) -> bool {
    if explanations.best_vs_others.is_empty() {
        return false;
    }
    explanations.best_vs_others.iter().all(|row| {
        !row.winner_profile.trim().is_empty() && !row.challenger_profile.trim().is_empty()
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::governance::SnapshotKpis;

    fn snapshot(status: Decision, risks: &[&str]) -> GovernanceSnapshot {
        GovernanceSnapshot {
            status,
            kpis: SnapshotKpis {
                review_recovery_rate: Some(0.8),
                fail_rate: Some(0.1),
                recommended_profile: Some("default".to_string()),
                ..SnapshotKpis::default()
            },
            risks: risks.iter().map(|s| (*s).to_string()).collect(),
            sources: BTreeMap::new(),
            trend: None,
        }
    }

    fn profile() -> PromotionProfile {
        PromotionProfile {
            require_status: vec!["PASS".to_string()],
            require_kpi_floors: serde_json::from_value(serde_json::json!({
                "review_recovery_rate": 0.5,
            }))
            .expect("floors"),
            require_no_risks: vec!["ci_matrix_failed".to_string()],
            allow_promote_even_if_needs_review: false,
        }
    }

    #[test]
    fn clean_pass_snapshot_promotes() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let (decision, reasons, ..) =
            evaluate_promotion(&snapshot(Decision::Pass, &[]), &profile(), None, now);
        assert_eq!(decision, Decision::Pass);
        assert!(reasons.is_empty());
    }

    #[test]
    fn blocked_risk_fails_promotion() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let (decision, reasons, ..) = evaluate_promotion(
            &snapshot(Decision::Pass, &["ci_matrix_failed"]),
            &profile(),
            None,
            now,
        );
        assert_eq!(decision, Decision::Fail);
        assert_eq!(reasons, vec!["blocked_risk:ci_matrix_failed"]);
    }

    #[test]
    fn kpi_floor_violation_needs_review() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let mut snap = snapshot(Decision::Pass, &[]);
        snap.kpis.review_recovery_rate = Some(0.2);
        let (decision, reasons, ..) = evaluate_promotion(&snap, &profile(), None, now);
        assert_eq!(decision, Decision::NeedsReview);
        assert!(reasons[0].starts_with("kpi_below_floor:review_recovery_rate"));
    }

    #[test]
    fn expired_override_is_ignored() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let override_file = PromotionOverride {
            allow_promote: true,
            reason: Some("release window".to_string()),
            approver: Some("dora".to_string()),
            expires_utc: Some("2026-01-01T00:00:00Z".to_string()),
        };
        let (decision, _, applied, active, reason) = evaluate_promotion(
            &snapshot(Decision::Fail, &[]),
            &profile(),
            Some(&override_file),
            now,
        );
        assert_eq!(decision, Decision::Fail);
        assert!(!applied);
        assert!(!active);
        assert_eq!(reason.as_deref(), Some("override_expired"));
    }

    #[test]
    fn active_override_allows_promotion() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let override_file = PromotionOverride {
            allow_promote: true,
            reason: Some("release window".to_string()),
            approver: Some("dora".to_string()),
            expires_utc: Some("2026-12-01T00:00:00Z".to_string()),
        };
        let (decision, reasons, applied, ..) = evaluate_promotion(
            &snapshot(Decision::NeedsReview, &[]),
            &profile(),
            Some(&override_file),
            now,
        );
        assert_eq!(decision, Decision::Pass);
        assert!(applied);
        assert_eq!(reasons, vec!["override_allow_promote:release window"]);
    }

    #[test]
    fn explanation_quality_scores_rounded_percent() {
        let explanations = DecisionExplanations {
            selection_priority: vec!["total_score".to_string()],
            best_vs_others: vec![BestVsOther {
                winner_profile: "a".to_string(),
                challenger_profile: "b".to_string(),
                winner_total_score: 110,
                challenger_total_score: 100,
                score_margin: 10,
                tie_on_total_score: false,
                winner_advantages: vec!["decision".to_string()],
            }],
        };
        let quality = assess_explanations(&explanations, 2);
        assert_eq!(quality.score, 100);
        let broken = DecisionExplanations {
            selection_priority: Vec::new(),
            best_vs_others: Vec::new(),
        };
        let quality = assess_explanations(&broken, 2);
        assert!(quality.score < 100);
    }
}
