// gateforge-pipeline/src/invariant.rs
// ============================================================================
// Module: GateForge Invariant Repair
// Description: Invariant-triggered repair plans and profile comparison.
// Purpose: Plan and score repairs for physical invariant violations.
// Dependencies: gateforge-core, crate::repair, serde
// ============================================================================

//! ## Overview
//! When a summary carries `physical_invariant_*` reasons, the invariant
//! repair plan narrows the repair: the `invariant_guard` checker joins the
//! run, the declared invariants travel through the planner context, and the
//! change-plan whitelist shrinks to the model files. The compare tool runs
//! the repair loop under several invariant-repair profiles and ranks them
//! with a weighted component score.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use gateforge_core::DeltaRelation;
use gateforge_core::RunStatus;
use gateforge_core::io::read_json;
use gateforge_core::io::write_json_atomic;
use gateforge_core::io::write_text;
use gateforge_config::PolicySelection;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::backend::default_md_path;
use crate::error::PipelineError;
use crate::planner::PlannerBackend;
use crate::repair::INVARIANT_REASON_PREFIX;
use crate::repair::RepairRequest;
use crate::repair::collect_reasons;
use crate::repair::extract_invariants;
use crate::repair::run_repair_loop;
use crate::repair::source_kind;
use crate::report;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default confidence floor for invariant repair plans.
pub const DEFAULT_INVARIANT_CONFIDENCE_MIN: f64 = 0.8;

/// Default file whitelist for invariant repairs.
pub const DEFAULT_ALLOWED_FILES: &[&str] = &["demos/openmodelica/MinimalProbe.mo"];

// ============================================================================
// SECTION: Plan Model
// ============================================================================

/// Invariant repair plan artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantRepairPlan {
    /// Source summary path.
    pub source_path: String,
    /// Source classification.
    pub source_kind: String,
    /// Source proposal id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_proposal_id: Option<String>,
    /// Source status label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_status: Option<String>,
    /// Whether invariant reasons were detected.
    pub invariant_repair_detected: bool,
    /// Whether the invariant branch will be applied.
    pub invariant_repair_applied: bool,
    /// Detected invariant reasons.
    pub invariant_reasons: Vec<String>,
    /// Count of invariant reasons.
    pub invariant_reason_count: usize,
    /// Count of all source reasons.
    pub source_reason_count: usize,
    /// Repair goal.
    pub goal: String,
    /// Planner context derived for the repair.
    pub context_json: Map<String, Value>,
    /// Confidence floor for the plan.
    pub planner_change_plan_confidence_min: f64,
    /// File whitelist for the plan.
    pub planner_change_plan_allowed_files: Vec<String>,
}

/// Builds an invariant repair plan from a failing summary.
///
/// # Errors
///
/// Returns [`PipelineError`] on read or write failure.
pub fn build_invariant_repair_plan(
    source_path: &Path,
    allowed_files: Option<&[String]>,
    confidence_min: f64,
    out_path: &Path,
    report_path: Option<&Path>,
) -> Result<InvariantRepairPlan, PipelineError> {
    let source: Value = read_json(source_path)?;
    let reasons = collect_reasons(&source);
    let invariant_reasons: Vec<String> = reasons
        .iter()
        .filter(|r| r.starts_with(INVARIANT_REASON_PREFIX))
        .cloned()
        .collect();
    let detected = !invariant_reasons.is_empty();
    let allowed: Vec<String> = allowed_files
        .map(<[String]>::to_vec)
        .unwrap_or_else(|| DEFAULT_ALLOWED_FILES.iter().map(|s| (*s).to_string()).collect());

    let src_risk = source.get("risk_level").and_then(Value::as_str).unwrap_or("low");
    let planned_risk = if src_risk == "high" { "medium" } else { src_risk };

    let mut context = Map::new();
    context.insert("risk_level".to_string(), json!(planned_risk));
    context.insert(
        "change_summary".to_string(),
        json!(format!(
            "Invariant-guided repair for reasons: {}",
            if invariant_reasons.is_empty() {
                "none".to_string()
            } else {
                invariant_reasons.join(",")
            }
        )),
    );
    context.insert("checkers".to_string(), json!(["invariant_guard"]));
    if let Some(invariants) = extract_invariants(&source) {
        context.insert("physical_invariants".to_string(), json!(invariants));
        context.insert(
            "checker_config".to_string(),
            json!({"invariant_guard": {"invariants": invariants}}),
        );
    }

    let plan = InvariantRepairPlan {
        source_path: source_path.display().to_string(),
        source_kind: source_kind(&source).to_string(),
        source_proposal_id: source
            .get("proposal_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        source_status: source
            .get("status")
            .or_else(|| source.get("decision"))
            .and_then(Value::as_str)
            .map(str::to_string),
        invariant_repair_detected: detected,
        invariant_repair_applied: detected,
        invariant_reason_count: invariant_reasons.len(),
        invariant_reasons,
        source_reason_count: reasons.len(),
        goal: "Repair physical invariant violations and rerun governance gate. Keep \
               change-set narrow and deterministic."
            .to_string(),
        context_json: context,
        planner_change_plan_confidence_min: confidence_min,
        planner_change_plan_allowed_files: allowed,
    };

    write_json_atomic(out_path, &plan)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::invariant_plan_markdown(&plan))?;
    Ok(plan)
}

// ============================================================================
// SECTION: Profile Compare
// ============================================================================

/// Scoring weights for invariant-repair profile comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantScoreWeights {
    /// Weight applied to the status score.
    pub status_weight: i64,
    /// Weight applied to the delta score.
    pub delta_weight: i64,
    /// Penalty per after-reason.
    pub reason_penalty: i64,
    /// Penalty applied when the safety guard fired.
    pub safety_penalty: i64,
    /// Scale applied to the enforced confidence floor.
    pub strictness_scale: i64,
}

impl Default for InvariantScoreWeights {
    fn default() -> Self {
        Self {
            status_weight: 100,
            delta_weight: 5,
            reason_penalty: 1,
            safety_penalty: 25,
            strictness_scale: 10,
        }
    }
}

/// One scored invariant-repair profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantProfileRow {
    /// Profile name.
    pub profile: String,
    /// Repair-loop final status.
    pub status: RunStatus,
    /// Before/after delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaRelation>,
    /// After-reason count.
    pub reasons_count: usize,
    /// Whether the safety guard fired.
    pub safety_guard_triggered: bool,
    /// Confidence floor enforced by the profile.
    pub planner_change_plan_confidence_min: f64,
    /// Status score component.
    pub status_component: i64,
    /// Delta score component.
    pub delta_component: i64,
    /// Reason penalty component.
    pub reason_component: i64,
    /// Safety penalty component.
    pub safety_component: i64,
    /// Strictness bonus component.
    pub strictness_component: i64,
    /// Total score.
    pub total_score: i64,
    /// Per-profile repair summary path.
    pub json_path: String,
    /// 1-based rank after sorting.
    pub rank: usize,
}

/// Invariant-repair compare summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantCompareSummary {
    /// Best-profile status.
    pub status: RunStatus,
    /// Source summary path.
    pub source_path: String,
    /// Winning profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_profile: Option<String>,
    /// Selection rationale label.
    pub best_reason: String,
    /// Winning total score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_total_score: Option<i64>,
    /// Scoring weights used.
    pub scoring: InvariantScoreWeights,
    /// Ranked rows.
    pub ranking: Vec<InvariantProfileRow>,
}

const fn delta_score(delta: Option<DeltaRelation>) -> i64 {
    match delta {
        Some(DeltaRelation::Improved) => 2,
        Some(DeltaRelation::Unchanged) => 1,
        Some(DeltaRelation::Worse) => -1,
        None => 0,
    }
}

/// Compares invariant-repair profiles on the same source.
///
/// # Errors
///
/// Returns [`PipelineError`] for failures before the summary is written.
#[allow(clippy::too_many_arguments)]
pub fn compare_invariant_profiles(
    root: &Path,
    source_path: &Path,
    profiles: &[String],
    planner_backend: PlannerBackend,
    baseline: &str,
    baseline_index: &Path,
    runtime_threshold: f64,
    policy: &PolicySelection,
    weights: &InvariantScoreWeights,
    out_dir: &Path,
    out_path: &Path,
    report_path: Option<&Path>,
) -> Result<InvariantCompareSummary, PipelineError> {
    if profiles.is_empty() {
        return Err(PipelineError::Input("at least one profile is required".to_string()));
    }

    let mut rows: Vec<InvariantProfileRow> = Vec::new();
    for profile in profiles {
        let profile_out = out_dir.join(format!("{profile}.json"));
        let request = RepairRequest {
            root,
            source_path,
            goal: None,
            planner_backend,
            strategy_profile: profile.clone(),
            proposal_id: None,
            baseline: baseline.to_string(),
            baseline_index: baseline_index.to_path_buf(),
            runtime_threshold,
            policy: policy.clone(),
            max_retries: 0,
            retry_on_failed_attempt: false,
            retry_confidence_min: DEFAULT_INVARIANT_CONFIDENCE_MIN,
            block_new_reason_prefix: None,
            new_critical_reasons: Vec::new(),
            invariant_repair_profile: Some(profile.clone()),
            out_path: profile_out.clone(),
            report_path: None,
        };
        let (status, delta, reasons_count, safety, confidence) =
            match run_repair_loop(&request) {
                Ok(summary) => (
                    summary.status,
                    Some(summary.comparison.delta),
                    summary.after.reasons.len(),
                    summary.safety_guard_triggered,
                    summary.planner_change_plan_confidence_min,
                ),
                Err(err) => {
                    tracing::warn!(profile = %profile, error = %err, "invariant profile run failed");
                    (RunStatus::Unknown, None, 0, false, 0.0)
                }
            };

        let status_component = i64::from(status.score()) * weights.status_weight;
        let delta_component = delta_score(delta) * weights.delta_weight;
        let reason_component = -(reasons_count as i64) * weights.reason_penalty.abs();
        let safety_component = if safety { -weights.safety_penalty.abs() } else { 0 };
        let strictness_component =
            (confidence * weights.strictness_scale as f64).round() as i64;
        rows.push(InvariantProfileRow {
            profile: profile.clone(),
            status,
            delta,
            reasons_count,
            safety_guard_triggered: safety,
            planner_change_plan_confidence_min: confidence,
            status_component,
            delta_component,
            reason_component,
            safety_component,
            strictness_component,
            total_score: status_component
                + delta_component
                + reason_component
                + safety_component
                + strictness_component,
            json_path: profile_out.display().to_string(),
            rank: 0,
        });
    }

    rows.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| b.status.score().cmp(&a.status.score()))
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }

    let best = rows.first().cloned();
    let status = best
        .as_ref()
        .map(|b| match b.status {
            RunStatus::Unknown => RunStatus::Fail,
            other => other,
        })
        .unwrap_or(RunStatus::Fail);

    let summary = InvariantCompareSummary {
        status,
        source_path: source_path.display().to_string(),
        best_profile: best.as_ref().map(|b| b.profile.clone()),
        best_reason: if best.is_some() { "highest_total_score" } else { "no_profiles" }
            .to_string(),
        best_total_score: best.map(|b| b.total_score),
        scoring: *weights,
        ranking: rows,
    };
    write_json_atomic(out_path, &summary)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::invariant_compare_markdown(&summary))?;
    Ok(summary)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn plan_detects_invariant_reasons() {
        let dir = TempDir::new().expect("tempdir");
        let source = json!({
            "proposal_id": "prop-7",
            "status": "FAIL",
            "policy_decision": "FAIL",
            "risk_level": "high",
            "policy_reasons": [
                "physical_invariant_range_violated:steady_state_error",
                "gate_not_pass",
            ],
            "fail_reasons": [
                "physical_invariant_range_violated:steady_state_error",
                "gate_not_pass",
            ],
            "checker_config": {
                "invariant_guard": {
                    "invariants": [
                        {"type": "range", "metric": "steady_state_error", "min": 0.0, "max": 0.08},
                    ],
                },
            },
        });
        let source_path = dir.path().join("summary.json");
        write_json_atomic(&source_path, &source).expect("source");

        let plan = build_invariant_repair_plan(
            &source_path,
            None,
            DEFAULT_INVARIANT_CONFIDENCE_MIN,
            &dir.path().join("plan.json"),
            None,
        )
        .expect("plan");

        assert!(plan.invariant_repair_detected);
        assert!(plan.invariant_repair_applied);
        assert_eq!(plan.invariant_reason_count, 1);
        assert_eq!(plan.source_reason_count, 2);
        // High-risk sources replan at medium.
        assert_eq!(plan.context_json.get("risk_level"), Some(&json!("medium")));
        assert!(plan.context_json.contains_key("physical_invariants"));
    }

    #[test]
    fn plan_without_invariant_reasons_is_not_applied() {
        let dir = TempDir::new().expect("tempdir");
        let source = json!({
            "proposal_id": "prop-8",
            "status": "FAIL",
            "policy_decision": "FAIL",
            "risk_level": "low",
            "fail_reasons": ["gate_not_pass"],
        });
        let source_path = dir.path().join("summary.json");
        write_json_atomic(&source_path, &source).expect("source");
        let plan = build_invariant_repair_plan(
            &source_path,
            None,
            DEFAULT_INVARIANT_CONFIDENCE_MIN,
            &dir.path().join("plan.json"),
            None,
        )
        .expect("plan");
        assert!(!plan.invariant_repair_detected);
        assert!(!plan.invariant_repair_applied);
    }

    #[test]
    fn delta_scores_order_improvement_first() {
        assert!(delta_score(Some(DeltaRelation::Improved)) > delta_score(Some(DeltaRelation::Unchanged)));
        assert!(delta_score(Some(DeltaRelation::Unchanged)) > delta_score(Some(DeltaRelation::Worse)));
    }
}
