// gateforge-pipeline/src/report.rs
// ============================================================================
// Module: GateForge Markdown Reports
// Description: Pure summary-to-markdown renderers.
// Purpose: Render human-facing reports; never a source of truth.
// Dependencies: gateforge-core, crate summaries
// ============================================================================

//! ## Overview
//! Every renderer is a pure function from a summary value to a markdown
//! string. Reports are presentation only; tests assert against the JSON
//! artifacts, never against these strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use gateforge_core::Evidence;
use gateforge_core::RegressionSummary;

use crate::batch::BatchSummary;
use crate::governance::GovernanceSnapshot;
use crate::history::HistorySummary;
use crate::invariant::InvariantCompareSummary;
use crate::invariant::InvariantRepairPlan;
use crate::promote::ApplySummary;
use crate::promote::CompareSummary;
use crate::promote::PromoteDecision;
use crate::repair::RepairLoopSummary;
use crate::review::LedgerSummary;
use crate::review::ResolutionSummary;
use crate::run::RunSummary;
use crate::tasks::RepairTasksSummary;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn bullet_list(lines: &mut Vec<String>, items: &[String]) {
    if items.is_empty() {
        lines.push("- `none`".to_string());
    } else {
        lines.extend(items.iter().map(|item| format!("- `{item}`")));
    }
}

fn finish(lines: Vec<String>) -> String {
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

// ============================================================================
// SECTION: Renderers
// ============================================================================

/// Renders a run report for one evidence artifact.
#[must_use]
pub fn evidence_markdown(evidence: &Evidence) -> String {
    let mut lines = vec![
        "# GateForge Run Report".to_string(),
        String::new(),
        format!("- gate: `{:?}`", evidence.gate),
        format!("- status: `{:?}`", evidence.status),
        format!("- failure_type: `{}`", evidence.failure_type),
        format!("- backend: `{}`", evidence.backend),
        format!("- model_script: `{}`", evidence.model_script.as_deref().unwrap_or("none")),
        format!("- check_ok: `{}`", evidence.check_ok),
        format!("- simulate_ok: `{}`", evidence.simulate_ok),
        format!("- exit_code: `{}`", evidence.exit_code),
        format!("- runtime_seconds: `{}`", evidence.metrics.runtime_seconds),
        String::new(),
        "## Log Excerpt".to_string(),
        String::new(),
        "```text".to_string(),
    ];
    lines.push(evidence.artifacts.log_excerpt.clone().unwrap_or_default());
    lines.push("```".to_string());
    finish(lines)
}

/// Renders a regression report.
#[must_use]
pub fn regression_markdown(summary: &RegressionSummary) -> String {
    let mut lines = vec![
        "# GateForge Regression Report".to_string(),
        String::new(),
        format!("- decision: `{}`", summary.decision),
        format!("- proposal_id: `{}`", summary.proposal_id.as_deref().unwrap_or("none")),
        format!("- strict: `{}`", summary.strict),
        format!("- strict_model_script: `{}`", summary.strict_model_script),
        format!("- baseline_run_id: `{}`", summary.baseline_run_id.as_deref().unwrap_or("none")),
        format!(
            "- candidate_run_id: `{}`",
            summary.candidate_run_id.as_deref().unwrap_or("none")
        ),
        format!("- baseline_runtime_seconds: `{}`", summary.baseline_runtime_seconds),
        format!("- candidate_runtime_seconds: `{}`", summary.candidate_runtime_seconds),
        format!("- runtime_threshold: `{}`", summary.runtime_threshold),
        String::new(),
        "## Reasons".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &summary.reasons);
    lines.extend([String::new(), "## Checker Findings".to_string(), String::new()]);
    if summary.findings.is_empty() {
        lines.push("- `none`".to_string());
    } else {
        for finding in &summary.findings {
            lines.push(format!(
                "- `{}` `{:?}` `{}`: {}",
                finding.checker, finding.severity, finding.reason, finding.message
            ));
        }
    }
    finish(lines)
}

/// Renders a proposal-run report.
#[must_use]
pub fn run_markdown(summary: &RunSummary) -> String {
    let actions: Vec<String> =
        summary.actions.iter().map(|a| format!("{a:?}").to_lowercase()).collect();
    let mut lines = vec![
        "# GateForge Proposal Run".to_string(),
        String::new(),
        format!("- proposal_id: `{}`", summary.proposal_id),
        format!("- status: `{}`", summary.status),
        format!("- risk_level: `{}`", summary.risk_level),
        format!("- policy_decision: `{}`", summary.policy_decision),
        format!("- actions: `{}`", actions.join(",")),
        format!("- smoke_executed: `{}`", summary.smoke_executed),
        format!("- regress_executed: `{}`", summary.regress_executed),
        format!("- change_apply_status: `{:?}`", summary.change_apply_status),
        format!("- change_set_hash: `{}`", summary.change_set_hash.as_deref().unwrap_or("none")),
        String::new(),
        "## Fail Reasons".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &summary.fail_reasons);
    lines.extend([String::new(), "## Policy Reasons".to_string(), String::new()]);
    bullet_list(&mut lines, &summary.policy_reasons);
    lines.extend([String::new(), "## Required Human Checks".to_string(), String::new()]);
    bullet_list(&mut lines, &summary.required_human_checks);
    lines.extend([String::new(), "## Human Hints".to_string(), String::new()]);
    bullet_list(&mut lines, &summary.human_hints);
    finish(lines)
}

/// Renders a repair-loop report.
#[must_use]
pub fn repair_loop_markdown(summary: &RepairLoopSummary) -> String {
    let mut lines = vec![
        "# GateForge Repair Loop Summary".to_string(),
        String::new(),
        format!("- status: `{}`", summary.status),
        format!("- planner_backend: `{}`", summary.planner_backend),
        format!("- source_path: `{}`", summary.source_path),
        format!("- source_kind: `{}`", summary.source_kind),
        format!("- goal: `{}`", summary.goal),
        format!("- retry_used: `{}`", summary.retry_used),
        format!("- safety_guard_triggered: `{}`", summary.safety_guard_triggered),
        format!("- invariant_repair_applied: `{}`", summary.invariant_repair_applied),
        String::new(),
        "## Before".to_string(),
        String::new(),
        format!("- status: `{}`", summary.before.status),
        format!("- reasons_count: `{}`", summary.before.reasons.len()),
        String::new(),
        "## After".to_string(),
        String::new(),
        format!("- status: `{}`", summary.after.status),
        format!("- reasons_count: `{}`", summary.after.reasons.len()),
        String::new(),
        "## Comparison".to_string(),
        String::new(),
        format!("- delta: `{:?}`", summary.comparison.delta),
        format!("- score_before: `{}`", summary.comparison.score_before),
        format!("- score_after: `{}`", summary.comparison.score_after),
        String::new(),
        "### Fixed Reasons".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &summary.comparison.fixed_reasons);
    lines.extend([String::new(), "### New Reasons".to_string(), String::new()]);
    bullet_list(&mut lines, &summary.comparison.new_reasons);
    finish(lines)
}

/// Renders a repair-batch report.
#[must_use]
pub fn batch_markdown(summary: &BatchSummary) -> String {
    let mut lines = vec![
        "# GateForge Repair Batch Summary".to_string(),
        String::new(),
        format!("- pack_id: `{}`", summary.pack_id),
        format!("- planner_backend_default: `{}`", summary.planner_backend_default),
        format!("- total_cases: `{}`", summary.counts.total_cases),
        format!("- pass_count: `{}`", summary.counts.pass_count),
        format!("- fail_count: `{}`", summary.counts.fail_count),
        format!("- needs_review_count: `{}`", summary.counts.needs_review_count),
        format!("- improved_count: `{}`", summary.counts.improved_count),
        format!("- unchanged_count: `{}`", summary.counts.unchanged_count),
        format!("- worse_count: `{}`", summary.counts.worse_count),
        format!("- safety_block_count: `{}`", summary.counts.safety_block_count),
        String::new(),
        "## Cases".to_string(),
        String::new(),
    ];
    if summary.cases.is_empty() {
        lines.push("- `none`".to_string());
    } else {
        for case in &summary.cases {
            lines.push(format!(
                "- `{}`: status=`{}` delta=`{:?}` retry_used=`{}`",
                case.name, case.status, case.delta, case.retry_used
            ));
        }
    }
    if let Some(compare) = &summary.profile_compare {
        lines.extend([
            String::new(),
            "## Policy Profile Comparison".to_string(),
            String::new(),
            format!("- from_policy_profile: `{}`", compare.from_policy_profile),
            format!("- to_policy_profile: `{}`", compare.to_policy_profile),
            format!("- total_compared_cases: `{}`", compare.total_compared_cases),
            format!("- downgrade_count: `{}`", compare.downgrade_count),
            format!("- strict_downgrade_rate: `{}`", compare.strict_downgrade_rate),
            format!("- recommended_profile: `{}`", compare.recommended_profile),
        ]);
    }
    finish(lines)
}

/// Renders a repair-tasks report.
#[must_use]
pub fn tasks_markdown(summary: &RepairTasksSummary) -> String {
    let mut lines = vec![
        "# GateForge Repair Tasks".to_string(),
        String::new(),
        format!("- proposal_id: `{}`", summary.proposal_id.as_deref().unwrap_or("none")),
        format!("- source_kind: `{}`", summary.source_kind),
        format!("- policy_decision: `{}`", summary.policy_decision),
        format!("- risk_level: `{}`", summary.risk_level),
        format!("- task_count: `{}`", summary.task_count),
        String::new(),
        "## Policy Reasons".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &summary.policy_reasons);
    lines.extend([String::new(), "## Tasks".to_string(), String::new()]);
    for task in &summary.tasks {
        lines.push(format!(
            "- `{}` [{}] {}: {}",
            task.id, task.category, task.title, task.description
        ));
    }
    finish(lines)
}

/// Renders a review-resolution report.
#[must_use]
pub fn resolution_markdown(summary: &ResolutionSummary) -> String {
    let mut lines = vec![
        "# GateForge Human Review Resolution".to_string(),
        String::new(),
        format!("- proposal_id: `{}`", summary.proposal_id.as_deref().unwrap_or("none")),
        format!("- source_status: `{}`", summary.source_status),
        format!("- final_status: `{}`", summary.final_status),
        format!("- review_id: `{}`", summary.review_id),
        format!("- reviewer: `{}`", summary.reviewer),
        format!("- human_decision: `{:?}`", summary.human_decision),
        format!(
            "- all_required_checks_completed: `{}`",
            summary.all_required_checks_completed
        ),
        String::new(),
        "## Final Reasons".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &summary.final_reasons);
    lines.extend([String::new(), "## Unresolved Required Checks".to_string(), String::new()]);
    bullet_list(&mut lines, &summary.unresolved_required_human_checks);
    finish(lines)
}

/// Renders a review-ledger summary report.
#[must_use]
pub fn ledger_markdown(summary: &LedgerSummary) -> String {
    let mut lines = vec![
        "# GateForge Review Ledger Summary".to_string(),
        String::new(),
        format!("- generated_at_utc: `{}`", summary.generated_at_utc),
        format!("- total_records: `{}`", summary.total_records),
        format!("- approval_rate: `{:.4}`", summary.kpis.approval_rate),
        format!("- fail_rate: `{:.4}`", summary.kpis.fail_rate),
        format!("- review_recovery_rate: `{:.4}`", summary.kpis.review_recovery_rate),
        format!("- strict_non_pass_rate: `{:.4}`", summary.kpis.strict_non_pass_rate),
        format!("- sla_breach_rate: `{:.4}`", summary.kpis.sla_breach_rate),
        format!(
            "- resolution_latency_avg_seconds: `{:.1}`",
            summary.kpis.resolution_latency_avg_seconds
        ),
        format!(
            "- resolution_latency_p95_seconds: `{:.1}`",
            summary.kpis.resolution_latency_p95_seconds
        ),
        String::new(),
        "## Status Counts".to_string(),
        String::new(),
    ];
    if summary.status_counts.is_empty() {
        lines.push("- `none`".to_string());
    } else {
        for (status, count) in &summary.status_counts {
            lines.push(format!("- {status}: `{count}`"));
        }
    }
    lines.extend([String::new(), "## Last 7 Days Volume".to_string(), String::new()]);
    lines.push(format!("- `{:?}`", summary.kpis.last_7_days_volume));
    finish(lines)
}

/// Renders a governance snapshot report.
#[must_use]
pub fn snapshot_markdown(snapshot: &GovernanceSnapshot) -> String {
    let mut lines = vec![
        "# GateForge Governance Snapshot".to_string(),
        String::new(),
        format!("- status: `{}`", snapshot.status),
        format!("- strict_downgrade_rate: `{:?}`", snapshot.kpis.strict_downgrade_rate),
        format!("- review_recovery_rate: `{:?}`", snapshot.kpis.review_recovery_rate),
        format!("- strict_non_pass_rate: `{:?}`", snapshot.kpis.strict_non_pass_rate),
        format!("- approval_rate: `{:?}`", snapshot.kpis.approval_rate),
        format!("- fail_rate: `{:?}`", snapshot.kpis.fail_rate),
        String::new(),
        "## Risks".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &snapshot.risks);
    lines.extend([String::new(), "## Sources".to_string(), String::new()]);
    for (key, value) in &snapshot.sources {
        lines.push(format!("- {key}: `{value}`"));
    }
    if let Some(trend) = &snapshot.trend {
        lines.extend([
            String::new(),
            "## Trend".to_string(),
            String::new(),
            format!("- status_transition: `{}`", trend.status_transition),
        ]);
        for (kpi, delta) in &trend.kpi_delta {
            lines.push(format!("- {kpi}: `{delta:+.4}`"));
        }
    }
    finish(lines)
}

/// Renders a governance-history report.
#[must_use]
pub fn history_markdown(summary: &HistorySummary) -> String {
    let kpis = &summary.transition_kpis;
    let mut lines = vec![
        "# GateForge Governance History Summary".to_string(),
        String::new(),
        format!("- total_records: `{}`", summary.total_records),
        format!("- window_size: `{}`", summary.window_size),
        format!("- latest_status: `{}`", summary.latest_status.as_deref().unwrap_or("none")),
        format!("- transition_count: `{}`", kpis.transition_count),
        format!("- better_count: `{}`", kpis.better_count),
        format!("- worse_count: `{}`", kpis.worse_count),
        format!("- max_worse_streak: `{}`", kpis.max_worse_streak),
        format!("- latest_worse_streak: `{}`", kpis.latest_worse_streak),
        String::new(),
        "## Alerts".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &summary.alerts);
    lines.extend([String::new(), "## Transitions".to_string(), String::new()]);
    if summary.transitions.is_empty() {
        lines.push("- `none`".to_string());
    } else {
        for t in &summary.transitions {
            lines.push(format!(
                "- `{}` -> `{}` ({}) at `{}`",
                t.from, t.to, t.relation, t.to_recorded_at_utc
            ));
        }
    }
    finish(lines)
}

/// Renders a promote-decision report.
#[must_use]
pub fn promote_markdown(decision: &PromoteDecision) -> String {
    let mut lines = vec![
        "# GateForge Governance Promote Decision".to_string(),
        String::new(),
        format!("- decision: `{}`", decision.decision),
        format!("- snapshot_status: `{}`", decision.status),
        format!("- profile: `{}`", decision.profile),
        format!("- profile_path: `{}`", decision.profile_path),
        format!("- override_applied: `{}`", decision.override_applied),
        String::new(),
        "## Signals".to_string(),
        String::new(),
    ];
    for (key, value) in &decision.signals {
        lines.push(format!("- {key}: `{value}`"));
    }
    lines.extend([String::new(), "## Reasons".to_string(), String::new()]);
    bullet_list(&mut lines, &decision.reasons);
    finish(lines)
}

/// Renders a promotion-compare report.
#[must_use]
pub fn compare_markdown(summary: &CompareSummary) -> String {
    let mut lines = vec![
        "# GateForge Governance Promote Compare".to_string(),
        String::new(),
        format!("- status: `{}`", summary.status),
        format!("- best_profile: `{}`", summary.best_profile.as_deref().unwrap_or("none")),
        format!("- best_decision: `{}`", summary.best_decision),
        format!("- best_total_score: `{}`", summary.best_total_score),
        format!("- top_score_margin: `{}`", summary.top_score_margin),
        format!(
            "- recommended_profile: `{}`",
            summary.recommended_profile.as_deref().unwrap_or("none")
        ),
        format!("- explanation_quality_score: `{}`", summary.explanation_quality.score),
        String::new(),
        "## Ranking".to_string(),
        String::new(),
    ];
    for row in &summary.ranking {
        lines.push(format!(
            "- rank={} profile=`{}` total_score=`{}` decision=`{}` reasons=`{}`",
            row.rank,
            row.profile,
            row.total_score,
            row.decision,
            row.reasons.len()
        ));
    }
    lines.extend([String::new(), "## Best vs Others".to_string(), String::new()]);
    if summary.decision_explanations.best_vs_others.is_empty() {
        lines.push("- `none`".to_string());
    } else {
        for row in &summary.decision_explanations.best_vs_others {
            lines.push(format!(
                "- winner=`{}` challenger=`{}` margin=`{}` advantages=`{}`",
                row.winner_profile,
                row.challenger_profile,
                row.score_margin,
                if row.winner_advantages.is_empty() {
                    "none".to_string()
                } else {
                    row.winner_advantages.join(",")
                }
            ));
        }
    }
    finish(lines)
}

/// Renders a promotion-apply report.
#[must_use]
pub fn apply_markdown(summary: &ApplySummary) -> String {
    let mut lines = vec![
        "# GateForge Governance Promote Apply".to_string(),
        String::new(),
        format!("- final_status: `{}`", summary.final_status),
        format!("- apply_action: `{:?}`", summary.apply_action),
        format!("- actor: `{}`", summary.actor),
        format!("- compare_status: `{}`", summary.compare_status),
        format!("- best_profile: `{}`", summary.best_profile.as_deref().unwrap_or("none")),
        format!("- best_decision: `{}`", summary.best_decision),
        format!(
            "- review_ticket_id: `{}`",
            summary.review_ticket_id.as_deref().unwrap_or("none")
        ),
        format!("- top_score_margin: `{}`", summary.top_score_margin),
        format!("- audit_path: `{}`", summary.audit_path),
        String::new(),
        "## Reasons".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &summary.reasons);
    finish(lines)
}

/// Renders an invariant-repair plan report.
#[must_use]
pub fn invariant_plan_markdown(plan: &InvariantRepairPlan) -> String {
    let mut lines = vec![
        "# GateForge Invariant Repair Plan".to_string(),
        String::new(),
        format!("- source_path: `{}`", plan.source_path),
        format!("- source_kind: `{}`", plan.source_kind),
        format!("- invariant_repair_detected: `{}`", plan.invariant_repair_detected),
        format!("- invariant_repair_applied: `{}`", plan.invariant_repair_applied),
        format!(
            "- planner_change_plan_confidence_min: `{}`",
            plan.planner_change_plan_confidence_min
        ),
        String::new(),
        "## Goal".to_string(),
        String::new(),
        format!("- `{}`", plan.goal),
        String::new(),
        "## Invariant Reasons".to_string(),
        String::new(),
    ];
    bullet_list(&mut lines, &plan.invariant_reasons);
    finish(lines)
}

/// Renders an invariant-repair compare report.
#[must_use]
pub fn invariant_compare_markdown(summary: &InvariantCompareSummary) -> String {
    let mut lines = vec![
        "# GateForge Invariant Repair Compare".to_string(),
        String::new(),
        format!("- status: `{}`", summary.status),
        format!("- best_profile: `{}`", summary.best_profile.as_deref().unwrap_or("none")),
        format!("- best_reason: `{}`", summary.best_reason),
        format!("- best_total_score: `{:?}`", summary.best_total_score),
        String::new(),
        "## Ranking".to_string(),
        String::new(),
    ];
    for row in &summary.ranking {
        lines.push(format!(
            "- rank={} profile=`{}` total_score=`{}` status=`{}` reasons=`{}`",
            row.rank, row.profile, row.total_score, row.status, row.reasons_count
        ));
    }
    finish(lines)
}
