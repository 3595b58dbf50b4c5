// gateforge-pipeline/src/tasks.rs
// ============================================================================
// Module: GateForge Repair Tasks and Pack Generation
// Description: Derive actionable tasks from a failing summary; build packs.
// Purpose: Bridge failed summaries into batchable repair cases.
// Dependencies: gateforge-core, gateforge-config, serde
// ============================================================================

//! ## Overview
//! `build_repair_tasks` turns a failing run or regression summary into a
//! categorized task list: triage, evidence inspection, required human
//! checks, one fix-plan task per policy reason, and a final validation task.
//! `build_repair_pack` converts the fix-plan tasks into a repair batch pack,
//! with per-risk retry budgets (high 0, medium 2, low 1).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use gateforge_core::Decision;
use gateforge_core::RiskLevel;
use gateforge_core::evaluate_policy;
use gateforge_core::io::read_json;
use gateforge_core::io::write_json_atomic;
use gateforge_core::io::write_text;
use gateforge_config::PolicySelection;
use gateforge_config::load_policy;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::backend::default_md_path;
use crate::batch::RepairCase;
use crate::batch::RepairPack;
use crate::error::PipelineError;
use crate::repair::collect_reasons;
use crate::repair::source_kind;
use crate::report;

// ============================================================================
// SECTION: Task Model
// ============================================================================

/// One actionable repair task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairTask {
    /// Stable task identifier (`T001`, `T002`, ...).
    pub id: String,
    /// Task category.
    pub category: String,
    /// Short title.
    pub title: String,
    /// What needs to be done.
    pub description: String,
    /// Where the task came from.
    pub source: String,
    /// Reason the task addresses, for fix-plan tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Repair tasks summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairTasksSummary {
    /// Source summary path.
    pub source_path: String,
    /// Source classification.
    pub source_kind: String,
    /// Proposal identifier, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    /// Source status label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Derived policy decision.
    pub policy_decision: Decision,
    /// Reasons driving the tasks.
    pub policy_reasons: Vec<String>,
    /// Risk level used for budgets.
    pub risk_level: RiskLevel,
    /// Policy file used.
    pub policy_path: String,
    /// Number of derived tasks.
    pub task_count: usize,
    /// Derived tasks in emission order.
    pub tasks: Vec<RepairTask>,
}

// ============================================================================
// SECTION: Task Derivation
// ============================================================================

/// Derives repair tasks from a failing summary.
///
/// # Errors
///
/// Returns [`PipelineError`] on read or policy resolution failure.
pub fn build_repair_tasks(
    root: &Path,
    source_path: &Path,
    policy: &PolicySelection,
    out_path: &Path,
    report_path: Option<&Path>,
) -> Result<RepairTasksSummary, PipelineError> {
    let (policy_file, resolved_policy_path) = load_policy(policy, root)?;
    let source: Value = read_json(source_path)?;

    let reasons = collect_reasons(&source);
    let risk_level = source
        .get("risk_level")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_value::<RiskLevel>(json!(raw)).ok())
        .unwrap_or(RiskLevel::Low);
    let declared_decision = source
        .get("policy_decision")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_value::<Decision>(json!(raw)).ok());
    let (policy_decision, policy_reasons) = match declared_decision {
        Some(decision) => (decision, reasons.clone()),
        None => {
            let outcome = evaluate_policy(&reasons, risk_level, &policy_file);
            let driving = if outcome.policy_reasons.is_empty() {
                reasons.clone()
            } else {
                outcome.policy_reasons
            };
            (outcome.policy_decision, driving)
        }
    };

    let mut tasks = Vec::new();
    let mut task_id = 0_usize;
    let mut add = |tasks: &mut Vec<RepairTask>,
                   category: &str,
                   title: &str,
                   description: String,
                   from: &str,
                   reason: Option<String>| {
        task_id += 1;
        tasks.push(RepairTask {
            id: format!("T{task_id:03}"),
            category: category.to_string(),
            title: title.to_string(),
            description,
            source: from.to_string(),
            reason,
        });
    };

    add(
        &mut tasks,
        "triage",
        "Classify failure and scope impact",
        "Confirm source summary fields (status/policy_decision/reasons/backend/model_script) \
         and classify the failure family."
            .to_string(),
        "default",
        None,
    );
    if let Some(candidate) = source.get("candidate_path").and_then(Value::as_str) {
        add(
            &mut tasks,
            "evidence",
            "Inspect candidate evidence artifact",
            format!(
                "Open candidate evidence JSON at {candidate} and verify \
                 failure_type/log_excerpt consistency."
            ),
            "candidate_path",
            None,
        );
    }
    if let Some(regression) = source.get("regression_path").and_then(Value::as_str) {
        add(
            &mut tasks,
            "evidence",
            "Inspect regression artifact",
            format!("Open regression JSON at {regression} and validate reason list/findings."),
            "regression_path",
            None,
        );
    }
    if policy_decision == Decision::NeedsReview {
        let checks = policy_file
            .required_human_checks
            .by_risk
            .get(risk_level)
            .cloned()
            .unwrap_or_default();
        for check in checks {
            add(
                &mut tasks,
                "required_check",
                "Required human check",
                check,
                "policy.required_human_checks",
                None,
            );
        }
    }
    for reason in &policy_reasons {
        add(
            &mut tasks,
            "fix_plan",
            &format!("Address reason: {reason}"),
            format!(
                "Create targeted fix proposal for `{reason}` and prepare rerun evidence to \
                 confirm resolution."
            ),
            "policy_reasons",
            Some(reason.clone()),
        );
    }
    add(
        &mut tasks,
        "validation",
        "Rerun gate after fix",
        "Rerun proposal/check/simulate/regress and verify the decision reaches PASS or an \
         accepted NEEDS_REVIEW with justification."
            .to_string(),
        "default",
        None,
    );

    let summary = RepairTasksSummary {
        source_path: source_path.display().to_string(),
        source_kind: source_kind(&source).to_string(),
        proposal_id: source.get("proposal_id").and_then(Value::as_str).map(str::to_string),
        status: source
            .get("status")
            .or_else(|| source.get("decision"))
            .and_then(Value::as_str)
            .map(str::to_string),
        policy_decision,
        policy_reasons,
        risk_level,
        policy_path: resolved_policy_path.display().to_string(),
        task_count: tasks.len(),
        tasks,
    };

    write_json_atomic(out_path, &summary)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::tasks_markdown(&summary))?;
    Ok(summary)
}

// ============================================================================
// SECTION: Pack Generation
// ============================================================================

/// Per-risk retry budget for generated cases.
#[must_use]
pub const fn retry_budget_for_risk(risk: RiskLevel) -> u32 {
    match risk {
        RiskLevel::High => 0,
        RiskLevel::Medium => 2,
        RiskLevel::Low => 1,
    }
}

/// Converts fix-plan tasks into a repair batch pack.
///
/// # Errors
///
/// Returns [`PipelineError::Input`] when `max_cases` is zero or the tasks
/// summary carries no source path.
pub fn build_repair_pack(
    tasks_summary: &RepairTasksSummary,
    pack_id: &str,
    planner_backend: &str,
    policy_profile: Option<&str>,
    max_cases: usize,
    out_path: &Path,
) -> Result<RepairPack, PipelineError> {
    if max_cases == 0 {
        return Err(PipelineError::Input("max_cases must be > 0".to_string()));
    }
    if tasks_summary.source_path.trim().is_empty() {
        return Err(PipelineError::Input("tasks summary must contain source_path".to_string()));
    }

    let retry_budget = retry_budget_for_risk(tasks_summary.risk_level);
    let fix_tasks: Vec<&RepairTask> =
        tasks_summary.tasks.iter().filter(|t| t.category == "fix_plan").collect();

    let mut cases: Vec<RepairCase> = Vec::new();
    for (idx, task) in fix_tasks.iter().take(max_cases).enumerate() {
        let reason = task.reason.clone().unwrap_or_else(|| format!("reason_{}", idx + 1));
        let mut metadata = Map::new();
        metadata.insert("reason".to_string(), json!(reason));
        metadata.insert("task_id".to_string(), json!(task.id));
        cases.push(RepairCase {
            name: Some(format!("{:02}_{}", idx + 1, sanitize(&reason))),
            source: tasks_summary.source_path.clone(),
            planner_backend: Some(planner_backend.to_string()),
            baseline: None,
            max_retries: Some(retry_budget),
            policy_profile: policy_profile.map(str::to_string),
            proposal_id: None,
            metadata,
        });
    }
    if cases.is_empty() {
        let mut metadata = Map::new();
        metadata.insert("reason".to_string(), json!("generic_repair"));
        cases.push(RepairCase {
            name: Some("01_generic_repair".to_string()),
            source: tasks_summary.source_path.clone(),
            planner_backend: Some(planner_backend.to_string()),
            baseline: None,
            max_retries: Some(retry_budget),
            policy_profile: policy_profile.map(str::to_string),
            proposal_id: None,
            metadata,
        });
    }

    let pack = RepairPack {
        pack_id: pack_id.to_string(),
        generated_from: Some(tasks_summary.source_path.clone()),
        cases,
    };
    write_json_atomic(out_path, &pack)?;
    Ok(pack)
}

fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() { "case".to_string() } else { trimmed.to_string() }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn seed_policy(root: &Path) {
        std::fs::create_dir_all(root.join("policies")).expect("mkdir policies");
        let policy = json!({
            "policy_version": "t",
            "critical_reasons": ["gate_not_pass"],
            "runtime_only_policy_by_risk": {"low": "PASS", "medium": "NEEDS_REVIEW", "high": "FAIL"},
            "reason_to_decision_by_risk": {},
        });
        write_json_atomic(&root.join("policies/default_policy.json"), &policy).expect("policy");
    }

    #[test]
    fn fix_plan_tasks_cover_every_reason() {
        let dir = TempDir::new().expect("tempdir");
        seed_policy(dir.path());
        let source = json!({
            "proposal_id": "prop-3",
            "status": "FAIL",
            "policy_decision": "FAIL",
            "risk_level": "medium",
            "policy_reasons": ["gate_not_pass", "performance_regression_detected"],
            "fail_reasons": ["gate_not_pass", "performance_regression_detected"],
            "candidate_path": "artifacts/candidate.json",
        });
        let source_path = dir.path().join("run_summary.json");
        write_json_atomic(&source_path, &source).expect("source");

        let summary = build_repair_tasks(
            dir.path(),
            &source_path,
            &PolicySelection::default(),
            &dir.path().join("tasks.json"),
            None,
        )
        .expect("tasks");

        let fix_tasks: Vec<_> =
            summary.tasks.iter().filter(|t| t.category == "fix_plan").collect();
        assert_eq!(fix_tasks.len(), 2);
        assert_eq!(summary.risk_level, RiskLevel::Medium);
        assert!(summary.tasks.iter().any(|t| t.category == "triage"));
        assert!(summary.tasks.iter().any(|t| t.category == "validation"));
        assert!(summary.tasks.iter().any(|t| t.category == "evidence"));
    }

    #[test]
    fn pack_generation_applies_risk_retry_budget() {
        let dir = TempDir::new().expect("tempdir");
        seed_policy(dir.path());
        let source = json!({
            "proposal_id": "prop-3",
            "status": "FAIL",
            "policy_decision": "FAIL",
            "risk_level": "high",
            "fail_reasons": ["gate_not_pass"],
        });
        let source_path = dir.path().join("run_summary.json");
        write_json_atomic(&source_path, &source).expect("source");
        let summary = build_repair_tasks(
            dir.path(),
            &source_path,
            &PolicySelection::default(),
            &dir.path().join("tasks.json"),
            None,
        )
        .expect("tasks");

        let pack = build_repair_pack(
            &summary,
            "pack-1",
            "rule",
            Some("default_policy"),
            5,
            &dir.path().join("pack.json"),
        )
        .expect("pack");
        assert!(!pack.cases.is_empty());
        assert!(pack.cases.iter().all(|c| c.max_retries == Some(0)));
    }

    #[test]
    fn empty_fix_plan_falls_back_to_generic_case() {
        let dir = TempDir::new().expect("tempdir");
        seed_policy(dir.path());
        let source = json!({
            "proposal_id": "prop-4",
            "status": "PASS",
            "policy_decision": "PASS",
            "risk_level": "low",
            "policy_reasons": [],
            "fail_reasons": [],
        });
        let source_path = dir.path().join("run_summary.json");
        write_json_atomic(&source_path, &source).expect("source");
        let summary = build_repair_tasks(
            dir.path(),
            &source_path,
            &PolicySelection::default(),
            &dir.path().join("tasks.json"),
            None,
        )
        .expect("tasks");
        let pack = build_repair_pack(&summary, "pack-2", "rule", None, 3, &dir.path().join("pack.json"))
            .expect("pack");
        assert_eq!(pack.cases.len(), 1);
        assert_eq!(pack.cases[0].name.as_deref(), Some("01_generic_repair"));
    }
}
