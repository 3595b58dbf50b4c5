// gateforge-pipeline/src/run.rs
// ============================================================================
// Module: GateForge Run Orchestrator
// Description: Proposal-driven pipeline from validation to final summary.
// Purpose: Drive validate -> apply -> smoke -> regress -> policy -> finalize.
// Dependencies: gateforge-core, gateforge-config, crate::{backend, baseline, change}
// ============================================================================

//! ## Overview
//! The orchestrator is the single canonical execution path for a proposal:
//! every other surface (repair loop, batch, CLI) funnels through
//! [`run_proposal`]. Each stage may add typed fail reasons; the policy
//! overlay collapses the combined reason list into the final status. The
//! summary invariants hold by construction: `status=FAIL ⇔ fail_reasons ≠ ∅`
//! and a NEEDS_REVIEW status always carries required human checks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use gateforge_core::Decision;
use gateforge_core::Evidence;
use gateforge_core::Gate;
use gateforge_core::Policy;
use gateforge_core::Proposal;
use gateforge_core::RegressionOptions;
use gateforge_core::RiskLevel;
use gateforge_core::RunStatus;
use gateforge_core::Toolchain;
use gateforge_core::core::proposal::ProposalAction;
use gateforge_core::evaluate_policy;
use gateforge_core::io::read_json;
use gateforge_core::io::write_json_atomic;
use gateforge_core::io::write_text;
use gateforge_core::policy::dry_run_human_checks;
use gateforge_core::regression::baseline_missing_summary;
use gateforge_core::regression::compare_evidence;
use gateforge_core::schema::ArtifactKind;
use gateforge_core::schema::validate_artifact;
use gateforge_config::PolicySelection;
use gateforge_config::load_policy;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

use crate::backend::SmokeParams;
use crate::backend::default_md_path;
use crate::backend::run_smoke;
use crate::baseline::resolve_baseline_path;
use crate::change::AppliedChange;
use crate::change::apply_change_set;
use crate::change::load_change_set;
use crate::error::PipelineError;
use crate::planner::GuardrailOutcome;
use crate::planner::GuardrailViolation;
use crate::report;

// ============================================================================
// SECTION: Summary Model
// ============================================================================

/// Change-apply stage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangeApplyStatus {
    /// Proposal carried no change set.
    #[default]
    NotRequested,
    /// Change set applied cleanly.
    Applied,
    /// Change set failed to apply.
    Failed,
}

/// Top-level record of a proposal-driven run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Proposal identifier.
    pub proposal_id: String,
    /// Declared risk level.
    pub risk_level: RiskLevel,
    /// Requested actions.
    pub actions: Vec<ProposalAction>,
    /// Final status.
    pub status: RunStatus,
    /// Policy overlay decision.
    pub policy_decision: Decision,
    /// Reasons that drove the policy decision.
    pub policy_reasons: Vec<String>,
    /// Every detected failure cause; non-empty iff status is FAIL.
    pub fail_reasons: Vec<String>,
    /// Human checks required when status is NEEDS_REVIEW.
    pub required_human_checks: Vec<String>,
    /// Operational hints for triage.
    pub human_hints: Vec<String>,
    /// Policy file used for the overlay.
    pub policy_path: String,
    /// Whether the smoke stage executed.
    pub smoke_executed: bool,
    /// Whether the regress stage executed.
    pub regress_executed: bool,
    /// Whether this was a dry run.
    #[serde(default)]
    pub dry_run: bool,
    /// Candidate evidence path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_path: Option<String>,
    /// Baseline evidence path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_path: Option<String>,
    /// Regression summary path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_path: Option<String>,
    /// Change-set artifact path from the proposal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set_path: Option<String>,
    /// Change-apply stage status.
    #[serde(default)]
    pub change_apply_status: ChangeApplyStatus,
    /// Canonical change-set hash when applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set_hash: Option<String>,
    /// Applied-change records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_changes: Vec<AppliedChange>,
    /// Planner guardrail decision, when the run was planner-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_guardrail_decision: Option<Decision>,
    /// Planner guardrail violations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planner_guardrail_violations: Vec<GuardrailViolation>,
    /// Toolchain provenance.
    #[serde(default)]
    pub toolchain: Toolchain,
}

impl RunSummary {
    /// Builds a summary for a run rejected by planner guardrails.
    ///
    /// The run never executes; every violation rule id becomes a fail
    /// reason so no cause is silently dropped.
    #[must_use]
    pub fn guardrail_rejected(
        proposal_id: &str,
        risk_level: RiskLevel,
        outcome: &GuardrailOutcome,
        policy_path: &str,
    ) -> Self {
        let fail_reasons: Vec<String> =
            outcome.violations.iter().map(|v| v.rule_id.clone()).collect();
        Self {
            proposal_id: proposal_id.to_string(),
            risk_level,
            actions: Vec::new(),
            status: RunStatus::Fail,
            policy_decision: Decision::Fail,
            policy_reasons: fail_reasons.clone(),
            fail_reasons,
            required_human_checks: Vec::new(),
            human_hints: vec![
                "Planner guardrails rejected the intent; inspect the violations and replan."
                    .to_string(),
            ],
            policy_path: policy_path.to_string(),
            smoke_executed: false,
            regress_executed: false,
            dry_run: false,
            candidate_path: None,
            baseline_path: None,
            regression_path: None,
            change_set_path: None,
            change_apply_status: ChangeApplyStatus::NotRequested,
            change_set_hash: None,
            applied_changes: Vec::new(),
            planner_guardrail_decision: Some(outcome.decision),
            planner_guardrail_violations: outcome.violations.clone(),
            toolchain: Toolchain::default(),
        }
    }
}

// ============================================================================
// SECTION: Request
// ============================================================================

/// Inputs for one proposal-driven run.
pub struct RunRequest<'a> {
    /// Repository root used for policy and baseline resolution.
    pub root: &'a Path,
    /// Proposal artifact path.
    pub proposal_path: &'a Path,
    /// Run summary output path.
    pub out_path: &'a Path,
    /// Optional markdown report path.
    pub report_path: Option<&'a Path>,
    /// Candidate evidence output path (when execution runs).
    pub candidate_out: &'a Path,
    /// Pre-existing candidate evidence (regress without execution).
    pub candidate_in: Option<&'a Path>,
    /// Regression summary output path.
    pub regression_out: &'a Path,
    /// Baseline path or `auto`.
    pub baseline: &'a str,
    /// Baseline index path for `auto` resolution.
    pub baseline_index: &'a Path,
    /// Allowed runtime regression ratio.
    pub runtime_threshold: f64,
    /// Policy selection.
    pub policy: PolicySelection,
    /// Plan-only mode: validate and surface dry-run checks, skip execution.
    pub dry_run: bool,
    /// Guardrail outcome recorded when the run is planner-driven.
    pub guardrail: Option<&'a GuardrailOutcome>,
}

// ============================================================================
// SECTION: Orchestration
// ============================================================================

/// Runs a proposal through the full pipeline.
///
/// # Errors
///
/// Returns [`PipelineError`] for failures before any output is written
/// (malformed proposal, unknown policy profile, unresolvable baseline).
/// Failures after that point surface inside the written summary.
pub fn run_proposal(req: &RunRequest<'_>) -> Result<RunSummary, PipelineError> {
    let raw: Value = read_json(req.proposal_path)?;
    validate_artifact(ArtifactKind::Proposal, &raw)
        .map_err(|err| PipelineError::Input(err.to_string()))?;
    let proposal: Proposal = serde_json::from_value(raw).map_err(|err| {
        PipelineError::Input(format!("proposal did not parse: {err}"))
    })?;
    proposal.validate()?;

    let (policy, policy_path) = load_policy(&req.policy, req.root)?;
    let policy_path_str = policy_path.display().to_string();

    tracing::info!(
        proposal_id = %proposal.proposal_id,
        risk = %proposal.risk_level,
        "proposal run starting"
    );

    let mut summary = RunSummary {
        proposal_id: proposal.proposal_id.clone(),
        risk_level: proposal.risk_level,
        actions: proposal.requested_actions.clone(),
        status: RunStatus::Pass,
        policy_decision: Decision::Pass,
        policy_reasons: Vec::new(),
        fail_reasons: Vec::new(),
        required_human_checks: Vec::new(),
        human_hints: Vec::new(),
        policy_path: policy_path_str.clone(),
        smoke_executed: false,
        regress_executed: false,
        dry_run: req.dry_run,
        candidate_path: None,
        baseline_path: None,
        regression_path: None,
        change_set_path: proposal.change_set_path.clone(),
        change_apply_status: ChangeApplyStatus::NotRequested,
        change_set_hash: None,
        applied_changes: Vec::new(),
        planner_guardrail_decision: req.guardrail.map(|g| g.decision),
        planner_guardrail_violations: req
            .guardrail
            .map(|g| g.violations.clone())
            .unwrap_or_default(),
        toolchain: Toolchain {
            backend_version: None,
            docker_image: None,
            policy_profile: req.policy.profile.clone(),
            policy_version: policy.policy_version.clone(),
        },
    };

    if req.dry_run {
        summary.required_human_checks = dry_run_human_checks(
            &policy,
            proposal.risk_level,
            proposal.change_set_path.is_some(),
        );
        finalize(req, &mut summary, &[], &policy)?;
        return Ok(summary);
    }

    let mut combined_reasons: Vec<String> = Vec::new();
    let mut candidate: Option<Evidence> = None;
    let execution_requested = proposal.requests_execution();

    // Change apply runs inside a scoped workspace so backend artifacts and
    // patched sources never touch the repository.
    let mut source_override: Option<TempDir> = None;
    if execution_requested {
        if let Some(change_set_path) = &proposal.change_set_path {
            match stage_change_set(req.root, change_set_path) {
                Ok((workspace, hash, applied)) => {
                    summary.change_apply_status = ChangeApplyStatus::Applied;
                    summary.change_set_hash = Some(hash);
                    summary.applied_changes = applied;
                    source_override = Some(workspace);
                }
                Err(err) => {
                    summary.change_apply_status = ChangeApplyStatus::Failed;
                    push_unique(&mut combined_reasons, "change_apply_failed");
                    summary.human_hints.push(format!("Change-set apply failed: {err}"));
                }
            }
        }
    }

    if execution_requested && summary.change_apply_status != ChangeApplyStatus::Failed {
        let params = SmokeParams {
            backend: &proposal.backend,
            out_path: req.candidate_out,
            report_path: None,
            script_path: Some(&proposal.model_script),
            proposal_id: Some(&proposal.proposal_id),
            source_root: source_override.as_ref().map(TempDir::path),
            policy_profile: req.policy.profile.as_deref(),
            policy_version: policy.policy_version.as_deref(),
        };
        let evidence = run_smoke(&params)?;
        summary.smoke_executed = true;
        summary.candidate_path = Some(req.candidate_out.display().to_string());
        summary.toolchain.docker_image = evidence.toolchain.docker_image.clone();
        if evidence.gate != Gate::Pass {
            push_unique(&mut combined_reasons, "gate_not_pass");
        }
        candidate = Some(evidence);
    }

    if proposal.requests_regress() && summary.change_apply_status != ChangeApplyStatus::Failed {
        if candidate.is_none() {
            let candidate_in = req.candidate_in.ok_or_else(|| {
                PipelineError::Input(
                    "--candidate-in is required when regress is requested without \
                     execution actions"
                        .to_string(),
                )
            })?;
            candidate = Some(read_json(candidate_in)?);
            summary.candidate_path = Some(candidate_in.display().to_string());
        }

        if let Some(candidate) = &candidate {
            let baseline_path = resolve_baseline_path(
                req.baseline,
                req.baseline_index,
                &proposal.backend,
                &proposal.model_script,
            )?;
            let resolved_baseline = if baseline_path.is_absolute() {
                baseline_path.clone()
            } else {
                req.root.join(&baseline_path)
            };

            let options = regression_options(&proposal, req.runtime_threshold);
            let mut regression = match read_json::<Evidence>(&resolved_baseline) {
                Ok(baseline) => {
                    let mut result = compare_evidence(&baseline, candidate, &options)?;
                    result.apply_proposal_alignment(&baseline, candidate, &proposal);
                    result
                }
                Err(_) => baseline_missing_summary(&options),
            };
            regression.apply_policy(&policy, proposal.risk_level, Some(&policy_path_str));

            write_json_atomic(req.regression_out, &regression)?;
            write_text(
                &default_md_path(req.regression_out),
                &report::regression_markdown(&regression),
            )?;
            summary.regress_executed = true;
            summary.regression_path = Some(req.regression_out.display().to_string());
            summary.baseline_path = Some(baseline_path.display().to_string());
            for reason in &regression.reasons {
                push_unique(&mut combined_reasons, reason);
            }
        }
    }

    summary.human_hints.extend(docker_hints(candidate.as_ref(), &proposal.backend));
    finalize(req, &mut summary, &combined_reasons, &policy)?;
    Ok(summary)
}

/// Collapses combined reasons through the policy overlay and writes outputs.
fn finalize(
    req: &RunRequest<'_>,
    summary: &mut RunSummary,
    combined_reasons: &[String],
    policy: &Policy,
) -> Result<(), PipelineError> {
    let outcome = evaluate_policy(combined_reasons, summary.risk_level, policy);
    summary.policy_decision = outcome.policy_decision;
    summary.policy_reasons = outcome.policy_reasons;
    summary.status = RunStatus::from(outcome.policy_decision);
    summary.fail_reasons = if summary.status == RunStatus::Fail {
        combined_reasons.to_vec()
    } else {
        Vec::new()
    };
    if summary.status == RunStatus::NeedsReview {
        summary.required_human_checks = outcome.required_human_checks;
    }

    write_json_atomic(req.out_path, summary)?;
    let report_path = req
        .report_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_md_path(req.out_path));
    write_text(&report_path, &report::run_markdown(summary))?;
    tracing::info!(
        proposal_id = %summary.proposal_id,
        status = %summary.status,
        "proposal run finished"
    );
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Copies the demo sources into a scratch workspace and applies the change
/// set there.
fn stage_change_set(
    root: &Path,
    change_set_path: &str,
) -> Result<(TempDir, String, Vec<AppliedChange>), PipelineError> {
    let change_set = load_change_set(&root.join(change_set_path))?;
    let workspace = TempDir::with_prefix("gateforge-change-set-")
        .map_err(|err| PipelineError::Input(format!("workspace allocation failed: {err}")))?;
    let demos_src = root.join("demos");
    if demos_src.is_dir() {
        copy_dir(&demos_src, &workspace.path().join("demos"))?;
    }
    let result = apply_change_set(&change_set, workspace.path())?;
    Ok((workspace, result.change_set_hash, result.applied_changes))
}

fn copy_dir(src: &Path, dst: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dst)
        .map_err(|err| PipelineError::Input(format!("workspace mkdir: {err}")))?;
    for entry in std::fs::read_dir(src)
        .map_err(|err| PipelineError::Input(format!("source dir unreadable: {err}")))?
    {
        let entry = entry.map_err(|err| PipelineError::Input(err.to_string()))?;
        let target = dst.join(entry.file_name());
        let kind = entry.file_type().map_err(|err| PipelineError::Input(err.to_string()))?;
        if kind.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if kind.is_file() {
            std::fs::copy(entry.path(), &target)
                .map_err(|err| PipelineError::Input(err.to_string()))?;
        }
    }
    Ok(())
}

/// Builds the effective regression options for a proposal, injecting the
/// declared physical invariants into the invariant_guard config.
fn regression_options(proposal: &Proposal, runtime_threshold: f64) -> RegressionOptions {
    let mut checker_config = proposal.checker_config.clone();
    if !proposal.physical_invariants.is_empty() {
        let mut guard = checker_config
            .get("invariant_guard")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        guard.insert("invariants".to_string(), json!(proposal.physical_invariants));
        checker_config.insert("invariant_guard".to_string(), Value::Object(guard));
    }

    let mut checkers = proposal.checkers.clone();
    if !proposal.physical_invariants.is_empty() {
        if let Some(list) = &mut checkers {
            if !list.iter().any(|c| c == "invariant_guard") {
                list.push("invariant_guard".to_string());
            }
        }
    }

    RegressionOptions {
        runtime_threshold,
        strict: true,
        strict_model_script: true,
        strict_policy_version: false,
        checkers,
        checker_config,
    }
}

fn docker_hints(candidate: Option<&Evidence>, backend: &str) -> Vec<String> {
    let Some(candidate) = candidate else {
        return Vec::new();
    };
    if candidate.failure_type != gateforge_core::FailureType::DockerError {
        return Vec::new();
    }
    let mut hints = vec![
        "Docker backend execution failed. Start the Docker daemon and verify `docker ps` works."
            .to_string(),
        format!("Re-run the same proposal after Docker is healthy (backend: {backend})."),
    ];
    let log = candidate.artifacts.log_excerpt.as_deref().unwrap_or("");
    if log.to_ascii_lowercase().contains("permission denied") {
        hints.push(
            "Docker socket permission issue detected. Check current user access to the \
             Docker daemon."
                .to_string(),
        );
    }
    hints
}

fn push_unique(reasons: &mut Vec<String>, reason: &str) {
    if !reasons.iter().any(|r| r == reason) {
        reasons.push(reason.to_string());
    }
}
