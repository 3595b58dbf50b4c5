// gateforge-pipeline/src/repair.rs
// ============================================================================
// Module: GateForge Repair Loop
// Description: Fail -> constrained repair -> rerun loop with safety guard.
// Purpose: Attempt recovery of failing summaries without hiding new failures.
// Dependencies: gateforge-core, gateforge-config, crate::{planner, run}
// ============================================================================

//! ## Overview
//! The repair loop derives a repair intent from a failing or NEEDS_REVIEW
//! summary, replans and reruns the proposal, and compares before vs after
//! under the ordering FAIL(0) < NEEDS_REVIEW(1) < PASS(2). Two protections
//! bound the loop: a retry budget with a conservative fallback profile, and
//! a safety guard that refuses to let a repair introduce new critical
//! reasons — a guarded repair is forced to FAIL, never silently accepted.
//!
//! When the source carries a `physical_invariant_*` reason the loop enters
//! the invariant-repair branch: the `invariant_guard` checker joins the
//! effective checker list and the summary records
//! `invariant_repair_applied = true`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use gateforge_core::Decision;
use gateforge_core::PhysicalInvariant;
use gateforge_core::RiskLevel;
use gateforge_core::RunStatus;
use gateforge_core::DeltaRelation;
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
use crate::planner::GuardrailConfig;
use crate::planner::PlannerBackend;
use crate::planner::PlannerError;
use crate::planner::PlannerRequest;
use crate::planner::build_proposal_from_intent;
use crate::planner::evaluate_guardrails;
use crate::planner::plan_intent;
use crate::report;
use crate::run::RunRequest;
use crate::run::RunSummary;
use crate::run::run_proposal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reason prefix marking physical invariant violations.
pub const INVARIANT_REASON_PREFIX: &str = "physical_invariant_";

/// Reason prefix stamped by the safety guard.
pub const SAFETY_REASON_PREFIX: &str = "repair_safety_new_critical_reason:";

/// Default retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default confidence floor applied by the conservative retry profile.
pub const DEFAULT_RETRY_CONFIDENCE_MIN: f64 = 0.8;

// ============================================================================
// SECTION: Strategy Profiles
// ============================================================================

/// Resolves a repair strategy profile into guardrail configuration.
///
/// Unknown names fall back to the default profile so a typo cannot disable
/// the guardrails entirely.
#[must_use]
pub fn resolve_strategy_profile(name: &str) -> GuardrailConfig {
    match name {
        "conservative" => GuardrailConfig {
            change_plan_confidence_min: Some(0.8),
            change_plan_confidence_max: Some(0.99),
            allowed_roots: vec!["demos".to_string()],
            allowed_suffixes: vec![".mo".to_string(), ".mos".to_string()],
            allowed_files: Vec::new(),
        },
        "industrial_strict" | "industrial_strict_v0" => GuardrailConfig {
            change_plan_confidence_min: Some(0.9),
            change_plan_confidence_max: Some(0.99),
            allowed_roots: vec!["demos".to_string()],
            allowed_suffixes: vec![".mo".to_string(), ".mos".to_string()],
            allowed_files: Vec::new(),
        },
        _ => GuardrailConfig {
            change_plan_confidence_min: Some(0.5),
            change_plan_confidence_max: None,
            allowed_roots: vec!["demos".to_string()],
            allowed_suffixes: vec![".mo".to_string(), ".mos".to_string()],
            allowed_files: Vec::new(),
        },
    }
}

// ============================================================================
// SECTION: Source Normalization
// ============================================================================

/// Normalized view of a run or regression summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateView {
    /// Proposal identifier, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    /// Final status.
    pub status: RunStatus,
    /// Policy decision view (UNKNOWN when the source lacks one).
    pub policy_decision: RunStatus,
    /// Reason list driving the state.
    pub reasons: Vec<String>,
}

/// Classifies a loose summary payload.
#[must_use]
pub fn source_kind(payload: &Value) -> &'static str {
    let obj = payload.as_object();
    let has = |key: &str| obj.is_some_and(|o| o.contains_key(key));
    if has("policy_decision") && has("fail_reasons") {
        "run_summary"
    } else if has("decision") && has("reasons") {
        "regression"
    } else {
        "unknown"
    }
}

/// Extracts the driving reason list from a loose summary payload.
#[must_use]
pub fn collect_reasons(payload: &Value) -> Vec<String> {
    for key in ["policy_reasons", "fail_reasons", "reasons"] {
        if let Some(list) = payload.get(key).and_then(Value::as_array) {
            return list.iter().filter_map(Value::as_str).map(str::to_string).collect();
        }
    }
    Vec::new()
}

/// Normalizes a loose payload into a before-state view.
#[must_use]
pub fn normalize_state(payload: &Value) -> StateView {
    let status_label = payload
        .get("status")
        .and_then(Value::as_str)
        .or_else(|| payload.get("decision").and_then(Value::as_str))
        .unwrap_or("UNKNOWN");
    let decision_label = payload
        .get("policy_decision")
        .and_then(Value::as_str)
        .or_else(|| payload.get("decision").and_then(Value::as_str))
        .unwrap_or("UNKNOWN");
    StateView {
        proposal_id: payload.get("proposal_id").and_then(Value::as_str).map(str::to_string),
        status: RunStatus::from_label(status_label),
        policy_decision: RunStatus::from_label(decision_label),
        reasons: collect_reasons(payload),
    }
}

// ============================================================================
// SECTION: Request and Summary
// ============================================================================

/// Inputs for one repair loop.
pub struct RepairRequest<'a> {
    /// Repository root.
    pub root: &'a Path,
    /// Failing or NEEDS_REVIEW source summary path.
    pub source_path: &'a Path,
    /// Explicit repair goal; derived from the source when absent.
    pub goal: Option<String>,
    /// Planner backend for the first attempt.
    pub planner_backend: PlannerBackend,
    /// Strategy profile name for guardrail configuration.
    pub strategy_profile: String,
    /// Explicit proposal id for the repaired run.
    pub proposal_id: Option<String>,
    /// Baseline path or `auto`.
    pub baseline: String,
    /// Baseline index path.
    pub baseline_index: PathBuf,
    /// Allowed runtime regression ratio.
    pub runtime_threshold: f64,
    /// Policy selection.
    pub policy: PolicySelection,
    /// Retry budget: attempts beyond the first.
    pub max_retries: u32,
    /// Whether retries run at all.
    pub retry_on_failed_attempt: bool,
    /// Confidence floor applied by the conservative retry profile.
    pub retry_confidence_min: f64,
    /// Reason prefix the safety guard blocks.
    pub block_new_reason_prefix: Option<String>,
    /// Extra reasons the safety guard treats as critical.
    pub new_critical_reasons: Vec<String>,
    /// Invariant-repair profile name, when explicitly requested.
    pub invariant_repair_profile: Option<String>,
    /// Summary output path.
    pub out_path: PathBuf,
    /// Optional markdown report path.
    pub report_path: Option<PathBuf>,
}

/// One executed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt index.
    pub attempt: u32,
    /// Planner backend used.
    pub planner_backend: String,
    /// Strategy profile used.
    pub strategy_profile: String,
    /// Whether this attempt was a conservative retry.
    pub retry: bool,
    /// Guardrail decision for the planned intent.
    pub guardrail_decision: Decision,
    /// Attempt status after the rerun (and safety guard).
    pub status: RunStatus,
    /// Attempt reasons.
    pub reasons: Vec<String>,
    /// Run summary artifact for the attempt, when executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_summary_path: Option<String>,
}

/// Before/after score comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Relation of after vs before.
    pub delta: DeltaRelation,
    /// Before score under FAIL(0) < NEEDS_REVIEW(1) < PASS(2).
    pub score_before: i8,
    /// After score.
    pub score_after: i8,
    /// Reasons present before and resolved after.
    pub fixed_reasons: Vec<String>,
    /// Reasons absent before and introduced after.
    pub new_reasons: Vec<String>,
}

/// Repair-loop output artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairLoopSummary {
    /// Final status (the after state).
    pub status: RunStatus,
    /// Planner backend requested for the loop.
    pub planner_backend: String,
    /// Strategy profile requested for the loop.
    pub strategy_profile: String,
    /// Source summary path.
    pub source_path: String,
    /// Source classification.
    pub source_kind: String,
    /// Source proposal id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_proposal_id: Option<String>,
    /// Repair goal.
    pub goal: String,
    /// Before state.
    pub before: StateView,
    /// After state.
    pub after: StateView,
    /// Attempts in execution order; never empty.
    pub attempts: Vec<AttemptRecord>,
    /// Whether any conservative retry ran.
    pub retry_used: bool,
    /// Narrative of the retry decision, when a retry ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_analysis: Option<String>,
    /// Before/after comparison.
    pub comparison: Comparison,
    /// Whether the safety guard forced the outcome to FAIL.
    pub safety_guard_triggered: bool,
    /// Whether the invariant-repair branch was taken.
    pub invariant_repair_applied: bool,
    /// Confidence floor the planner guardrails enforced.
    pub planner_change_plan_confidence_min: f64,
}

// ============================================================================
// SECTION: Repair Loop
// ============================================================================

/// Runs the repair loop for a failing summary.
///
/// # Errors
///
/// Returns [`PipelineError`] for failures before the summary is written.
pub fn run_repair_loop(req: &RepairRequest<'_>) -> Result<RepairLoopSummary, PipelineError> {
    let source: Value = read_json(req.source_path)?;
    let before = normalize_state(&source);
    let kind = source_kind(&source);

    let invariant_reasons: Vec<String> = before
        .reasons
        .iter()
        .filter(|r| r.starts_with(INVARIANT_REASON_PREFIX))
        .cloned()
        .collect();
    let invariant_branch = !invariant_reasons.is_empty() || req.invariant_repair_profile.is_some();

    let goal = req.goal.clone().unwrap_or_else(|| default_goal(invariant_branch));
    let context = repair_context(&source, &before, kind, invariant_branch, &invariant_reasons);

    let out_dir = req
        .out_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let profile = resolve_strategy_profile(&req.strategy_profile);
    let confidence_min = profile.change_plan_confidence_min.unwrap_or(0.0);

    let mut attempts: Vec<AttemptRecord> = Vec::new();
    let mut after = before.clone();
    let mut safety_guard_triggered = false;
    let mut retry_used = false;
    let mut retry_analysis = None;

    let max_attempts = if req.retry_on_failed_attempt { req.max_retries + 1 } else { 1 };
    for attempt_index in 1..=max_attempts {
        let retry = attempt_index > 1;
        let (backend, guardrails) = if retry {
            retry_used = true;
            retry_analysis = Some(format!(
                "attempt {} failed; retrying with the rule planner and a confidence floor \
                 of {:.2}",
                attempt_index - 1,
                req.retry_confidence_min
            ));
            (PlannerBackend::Rule, retry_profile(&profile, req.retry_confidence_min))
        } else {
            (req.planner_backend, profile.clone())
        };

        let record = execute_attempt(
            req,
            &out_dir,
            attempt_index,
            retry,
            backend,
            &guardrails,
            &goal,
            &context,
            &before,
            &mut safety_guard_triggered,
        )?;
        after = StateView {
            proposal_id: after.proposal_id.clone(),
            status: record.status,
            policy_decision: record.status,
            reasons: record.reasons.clone(),
        };
        let failed = record.status != RunStatus::Pass && record.status != RunStatus::NeedsReview;
        attempts.push(record);
        if !failed {
            break;
        }
    }

    let score_before = before.status.score();
    let score_after = after.status.score();
    let before_set: Vec<&String> = before.reasons.iter().collect();
    let after_set: Vec<&String> = after.reasons.iter().collect();
    let mut fixed_reasons: Vec<String> = before
        .reasons
        .iter()
        .filter(|r| !after_set.contains(r))
        .cloned()
        .collect();
    fixed_reasons.sort();
    let mut new_reasons: Vec<String> = after
        .reasons
        .iter()
        .filter(|r| !before_set.contains(r))
        .cloned()
        .collect();
    new_reasons.sort();

    let summary = RepairLoopSummary {
        status: after.status,
        planner_backend: req.planner_backend.to_string(),
        strategy_profile: req.strategy_profile.clone(),
        source_path: req.source_path.display().to_string(),
        source_kind: kind.to_string(),
        source_proposal_id: before.proposal_id.clone(),
        goal,
        before,
        after,
        attempts,
        retry_used,
        retry_analysis,
        comparison: Comparison {
            delta: delta_from_scores(score_before, score_after),
            score_before,
            score_after,
            fixed_reasons,
            new_reasons,
        },
        safety_guard_triggered,
        invariant_repair_applied: invariant_branch,
        planner_change_plan_confidence_min: confidence_min,
    };

    write_json_atomic(&req.out_path, &summary)?;
    let report_path = req
        .report_path
        .clone()
        .unwrap_or_else(|| default_md_path(&req.out_path));
    write_text(&report_path, &report::repair_loop_markdown(&summary))?;
    Ok(summary)
}

const fn delta_from_scores(before: i8, after: i8) -> DeltaRelation {
    if after > before {
        DeltaRelation::Improved
    } else if after < before {
        DeltaRelation::Worse
    } else {
        DeltaRelation::Unchanged
    }
}

// ============================================================================
// SECTION: Attempt Execution
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn execute_attempt(
    req: &RepairRequest<'_>,
    out_dir: &Path,
    attempt_index: u32,
    retry: bool,
    backend: PlannerBackend,
    guardrails: &GuardrailConfig,
    goal: &str,
    context: &Map<String, Value>,
    before: &StateView,
    safety_guard_triggered: &mut bool,
) -> Result<AttemptRecord, PipelineError> {
    let attempt_dir = out_dir.join(format!("attempt_{attempt_index}"));
    let planner_req = PlannerRequest {
        goal: goal.to_string(),
        context: context.clone(),
        prefer_backend: None,
        proposal_id: req.proposal_id.clone(),
    };

    let intent = match plan_intent(backend, &planner_req) {
        Ok(intent) => intent,
        Err(err) => {
            let reason = planner_failure_reason(&err);
            return Ok(AttemptRecord {
                attempt: attempt_index,
                planner_backend: backend.to_string(),
                strategy_profile: req.strategy_profile.clone(),
                retry,
                guardrail_decision: Decision::Fail,
                status: RunStatus::Fail,
                reasons: vec![reason],
                run_summary_path: None,
            });
        }
    };

    let guardrail_outcome = evaluate_guardrails(&intent, guardrails);
    if guardrail_outcome.decision == Decision::Fail {
        let proposal_id =
            intent.proposal_id.clone().unwrap_or_else(|| "repair-rejected".to_string());
        let summary = RunSummary::guardrail_rejected(
            &proposal_id,
            RiskLevel::Low,
            &guardrail_outcome,
            "planner-guardrails",
        );
        let summary_path = attempt_dir.join("run_summary.json");
        write_json_atomic(&summary_path, &summary)?;
        return Ok(AttemptRecord {
            attempt: attempt_index,
            planner_backend: backend.to_string(),
            strategy_profile: req.strategy_profile.clone(),
            retry,
            guardrail_decision: Decision::Fail,
            status: RunStatus::Fail,
            reasons: summary.fail_reasons,
            run_summary_path: Some(summary_path.display().to_string()),
        });
    }

    let proposal = build_proposal_from_intent(&intent)?;
    let proposal_path = attempt_dir.join("proposal.json");
    write_json_atomic(&proposal_path, &proposal)?;

    let run_out = attempt_dir.join("run_summary.json");
    let candidate_out = attempt_dir.join("candidate.json");
    let regression_out = attempt_dir.join("regression.json");
    let run_req = RunRequest {
        root: req.root,
        proposal_path: &proposal_path,
        out_path: &run_out,
        report_path: None,
        candidate_out: &candidate_out,
        candidate_in: None,
        regression_out: &regression_out,
        baseline: &req.baseline,
        baseline_index: &req.baseline_index,
        runtime_threshold: req.runtime_threshold,
        policy: req.policy.clone(),
        dry_run: false,
        guardrail: Some(&guardrail_outcome),
    };
    let run_summary = run_proposal(&run_req)?;

    let mut status = run_summary.status;
    let mut reasons = if run_summary.policy_reasons.is_empty() {
        run_summary.fail_reasons.clone()
    } else {
        run_summary.policy_reasons.clone()
    };

    // Safety guard: a repair must not introduce new critical reasons.
    let new_critical: Vec<String> = reasons
        .iter()
        .filter(|reason| {
            let is_new = !before.reasons.contains(reason);
            let blocked_by_prefix = req
                .block_new_reason_prefix
                .as_deref()
                .is_some_and(|prefix| reason.starts_with(prefix));
            let in_critical_set = req.new_critical_reasons.iter().any(|c| c == *reason);
            is_new && (blocked_by_prefix || in_critical_set)
        })
        .cloned()
        .collect();
    if !new_critical.is_empty() {
        *safety_guard_triggered = true;
        status = RunStatus::Fail;
        for reason in new_critical {
            let tagged = format!("{SAFETY_REASON_PREFIX}{reason}");
            if !reasons.contains(&tagged) {
                reasons.push(tagged);
            }
        }
    }

    Ok(AttemptRecord {
        attempt: attempt_index,
        planner_backend: backend.to_string(),
        strategy_profile: req.strategy_profile.clone(),
        retry,
        guardrail_decision: guardrail_outcome.decision,
        status,
        reasons,
        run_summary_path: Some(run_out.display().to_string()),
    })
}

fn planner_failure_reason(err: &PlannerError) -> String {
    match err {
        PlannerError::BackendUnavailable { .. } => "planner_backend_unavailable".to_string(),
        PlannerError::InvalidOutput(_) => "planner_output_invalid".to_string(),
        PlannerError::MissingGoal => "planner_goal_missing".to_string(),
    }
}

/// Conservative retry profile: rule backend, tighter confidence floor, and
/// the whitelist restricted to files the change plan already names.
fn retry_profile(base: &GuardrailConfig, confidence_min: f64) -> GuardrailConfig {
    GuardrailConfig {
        change_plan_confidence_min: Some(confidence_min),
        change_plan_confidence_max: base.change_plan_confidence_max,
        allowed_roots: base.allowed_roots.clone(),
        allowed_suffixes: base.allowed_suffixes.clone(),
        allowed_files: base.allowed_files.clone(),
    }
}

// ============================================================================
// SECTION: Context Derivation
// ============================================================================

fn default_goal(invariant_branch: bool) -> String {
    if invariant_branch {
        "Repair physical invariant violations and rerun governance gate. \
         Keep change-set narrow and deterministic."
            .to_string()
    } else {
        "Repair failed governance gate and run demo mock pass under policy constraints. \
         Focus on stable, low-risk fix."
            .to_string()
    }
}

fn repair_context(
    source: &Value,
    before: &StateView,
    kind: &str,
    invariant_branch: bool,
    invariant_reasons: &[String],
) -> Map<String, Value> {
    let src_risk = source.get("risk_level").and_then(Value::as_str).unwrap_or("low");
    // High-risk sources replan one notch lower so the repair itself stays
    // reviewable.
    let planned_risk = if src_risk == "high" { "medium" } else { src_risk };

    let mut context = Map::new();
    context.insert("risk_level".to_string(), json!(planned_risk));
    context.insert(
        "change_summary".to_string(),
        json!(format!(
            "Repair loop from {kind} status={} policy_decision={} reasons={:?}",
            before.status, before.policy_decision, before.reasons
        )),
    );
    if invariant_branch {
        context.insert("checkers".to_string(), json!(["invariant_guard"]));
        if !invariant_reasons.is_empty() {
            context.insert("invariant_reasons".to_string(), json!(invariant_reasons));
        }
        if let Some(invariants) = extract_invariants(source) {
            context.insert("physical_invariants".to_string(), json!(invariants));
            context.insert(
                "checker_config".to_string(),
                json!({"invariant_guard": {"invariants": invariants}}),
            );
        }
    }
    context
}

/// Pulls declared invariants out of a loose source payload.
#[must_use]
pub fn extract_invariants(payload: &Value) -> Option<Vec<PhysicalInvariant>> {
    if let Some(list) = payload.get("physical_invariants") {
        if let Ok(parsed) = serde_json::from_value::<Vec<PhysicalInvariant>>(list.clone()) {
            if !parsed.is_empty() {
                return Some(parsed);
            }
        }
    }
    let nested = payload.pointer("/checker_config/invariant_guard/invariants")?;
    serde_json::from_value::<Vec<PhysicalInvariant>>(nested.clone())
        .ok()
        .filter(|v| !v.is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_normalization_reads_run_summaries() {
        let payload = json!({
            "proposal_id": "prop-9",
            "status": "FAIL",
            "policy_decision": "FAIL",
            "policy_reasons": ["gate_not_pass"],
            "fail_reasons": ["gate_not_pass"],
        });
        assert_eq!(source_kind(&payload), "run_summary");
        let view = normalize_state(&payload);
        assert_eq!(view.status, RunStatus::Fail);
        assert_eq!(view.reasons, vec!["gate_not_pass"]);
    }

    #[test]
    fn state_normalization_reads_regression_summaries() {
        let payload = json!({
            "decision": "NEEDS_REVIEW",
            "reasons": ["performance_regression_detected"],
        });
        assert_eq!(source_kind(&payload), "regression");
        let view = normalize_state(&payload);
        assert_eq!(view.status, RunStatus::NeedsReview);
        assert_eq!(view.policy_decision, RunStatus::NeedsReview);
    }

    #[test]
    fn invariants_are_extracted_from_checker_config() {
        let payload = json!({
            "checker_config": {
                "invariant_guard": {
                    "invariants": [
                        {"type": "range", "metric": "overshoot", "min": 0.0, "max": 0.1},
                    ],
                },
            },
        });
        let invariants = extract_invariants(&payload).expect("invariants");
        assert_eq!(invariants.len(), 1);
        assert_eq!(invariants[0].metric, "overshoot");
    }

    #[test]
    fn delta_follows_score_ordering() {
        assert_eq!(delta_from_scores(0, 2), DeltaRelation::Improved);
        assert_eq!(delta_from_scores(2, 0), DeltaRelation::Worse);
        assert_eq!(delta_from_scores(1, 1), DeltaRelation::Unchanged);
    }

    #[test]
    fn strategy_profiles_tighten_monotonically() {
        let default = resolve_strategy_profile("default");
        let conservative = resolve_strategy_profile("conservative");
        let strict = resolve_strategy_profile("industrial_strict");
        assert!(
            default.change_plan_confidence_min.unwrap()
                <= conservative.change_plan_confidence_min.unwrap()
        );
        assert!(
            conservative.change_plan_confidence_min.unwrap()
                <= strict.change_plan_confidence_min.unwrap()
        );
    }
}
