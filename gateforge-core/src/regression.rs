// gateforge-core/src/regression.rs
// ============================================================================
// Module: GateForge Regression Engine
// Description: Candidate vs baseline comparison with ordered reasons.
// Purpose: Produce deterministic regression summaries for the policy overlay.
// Dependencies: crate::{checkers, core, policy}, serde
// ============================================================================

//! ## Overview
//! The regression engine compares candidate evidence against a baseline and
//! emits an ordered, deduplicated reason list: strict comparability first,
//! then structural gates, then the runtime gate, then checker reasons in
//! registry order. The same inputs always produce byte-equal output; the
//! decision is fully determined by (reasons, risk level, policy).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::checkers::CheckerError;
use crate::checkers::Finding;
use crate::checkers::run_checkers;
use crate::core::decision::Decision;
use crate::core::decision::RiskLevel;
use crate::core::evidence::Evidence;
use crate::core::evidence::Gate;
use crate::core::evidence::RunOutcome;
use crate::core::proposal::Proposal;
use crate::policy::Policy;
use crate::policy::evaluate_policy;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Default allowed runtime regression ratio (+20%).
pub const DEFAULT_RUNTIME_THRESHOLD: f64 = 0.20;

/// Tunable comparison options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionOptions {
    /// Allowed runtime regression ratio (0.2 = +20%).
    pub runtime_threshold: f64,
    /// Enable strict comparability checks (schema_version/backend).
    pub strict: bool,
    /// In strict mode, also require model_script to match.
    pub strict_model_script: bool,
    /// In strict mode, also fail on policy_version mismatch.
    pub strict_policy_version: bool,
    /// Explicit checker selection; absent means all built-ins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkers: Option<Vec<String>>,
    /// Effective checker configuration.
    #[serde(default)]
    pub checker_config: Map<String, Value>,
}

impl Default for RegressionOptions {
    fn default() -> Self {
        Self {
            runtime_threshold: DEFAULT_RUNTIME_THRESHOLD,
            strict: false,
            strict_model_script: false,
            strict_policy_version: false,
            checkers: None,
            checker_config: Map::new(),
        }
    }
}

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Structured comparison of candidate vs baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionSummary {
    /// Collapsed decision.
    pub decision: Decision,
    /// Proposal the comparison belongs to, when proposal-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    /// Risk level used for the policy overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    /// Whether strict comparability was enforced.
    pub strict: bool,
    /// Whether model_script comparability was enforced.
    pub strict_model_script: bool,
    /// Whether policy_version comparability was enforced.
    pub strict_policy_version: bool,
    /// Baseline run identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_run_id: Option<String>,
    /// Candidate run identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_run_id: Option<String>,
    /// Allowed runtime regression ratio.
    pub runtime_threshold: f64,
    /// Baseline runtime in seconds.
    pub baseline_runtime_seconds: f64,
    /// Candidate runtime in seconds.
    pub candidate_runtime_seconds: f64,
    /// Ordered, deduplicated reason list.
    pub reasons: Vec<String>,
    /// Reasons that drove the policy decision.
    #[serde(default)]
    pub policy_reasons: Vec<String>,
    /// Human checks attached by the policy overlay.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_human_checks: Vec<String>,
    /// Structured checker findings.
    pub findings: Vec<Finding>,
    /// Effective checker selection.
    pub checkers: Vec<String>,
    /// Effective checker configuration.
    #[serde(default)]
    pub checker_config: Map<String, Value>,
    /// Policy file used for the overlay, when applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_path: Option<String>,
    /// Policy version used for the overlay, when applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    /// Backend the proposal expected, when proposal-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_expected_backend: Option<String>,
    /// Model script the proposal expected, when proposal-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_expected_model_script: Option<String>,
}

impl RegressionSummary {
    /// Appends a reason unless it is already present.
    pub fn push_reason(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    /// Applies the policy overlay, replacing the structural decision.
    pub fn apply_policy(
        &mut self,
        policy: &Policy,
        risk: RiskLevel,
        policy_path: Option<&str>,
    ) {
        let outcome = evaluate_policy(&self.reasons, risk, policy);
        self.decision = outcome.policy_decision;
        self.policy_reasons = outcome.policy_reasons;
        self.required_human_checks = outcome.required_human_checks;
        self.risk_level = Some(risk);
        self.policy_path = policy_path.map(str::to_string);
        self.policy_version = policy.policy_version.clone();
    }

    /// Appends proposal alignment reasons for backend/model_script drift.
    pub fn apply_proposal_alignment(
        &mut self,
        baseline: &Evidence,
        candidate: &Evidence,
        proposal: &Proposal,
    ) {
        if baseline.backend != proposal.backend {
            self.push_reason("proposal_backend_mismatch_baseline");
        }
        if candidate.backend != proposal.backend {
            self.push_reason("proposal_backend_mismatch_candidate");
        }
        if baseline.model_script.as_deref() != Some(proposal.model_script.as_str()) {
            self.push_reason("proposal_model_script_mismatch_baseline");
        }
        if candidate.model_script.as_deref() != Some(proposal.model_script.as_str()) {
            self.push_reason("proposal_model_script_mismatch_candidate");
        }
        if !self.reasons.is_empty() {
            self.decision = Decision::Fail;
        }
        self.proposal_id = Some(proposal.proposal_id.clone());
        self.proposal_expected_backend = Some(proposal.backend.clone());
        self.proposal_expected_model_script = Some(proposal.model_script.clone());
    }
}

// ============================================================================
// SECTION: Comparison
// ============================================================================

/// Compares candidate vs baseline evidence.
///
/// Without a policy overlay the decision is structural: FAIL when any reason
/// was emitted, PASS otherwise.
///
/// # Errors
///
/// Returns [`CheckerError`] when the checker selection names an unknown
/// checker.
pub fn compare_evidence(
    baseline: &Evidence,
    candidate: &Evidence,
    options: &RegressionOptions,
) -> Result<RegressionSummary, CheckerError> {
    let mut summary = RegressionSummary {
        decision: Decision::Pass,
        proposal_id: candidate.proposal_id.clone().or_else(|| baseline.proposal_id.clone()),
        risk_level: None,
        strict: options.strict,
        strict_model_script: options.strict_model_script,
        strict_policy_version: options.strict_policy_version,
        baseline_run_id: Some(baseline.run_id.clone()),
        candidate_run_id: Some(candidate.run_id.clone()),
        runtime_threshold: options.runtime_threshold,
        baseline_runtime_seconds: baseline.metrics.runtime_seconds,
        candidate_runtime_seconds: candidate.metrics.runtime_seconds,
        reasons: Vec::new(),
        policy_reasons: Vec::new(),
        required_human_checks: Vec::new(),
        findings: Vec::new(),
        checkers: Vec::new(),
        checker_config: options.checker_config.clone(),
        policy_path: None,
        policy_version: None,
        proposal_expected_backend: None,
        proposal_expected_model_script: None,
    };

    if options.strict {
        if baseline.schema_version != candidate.schema_version {
            summary.push_reason("strict_schema_version_mismatch");
        }
        if baseline.backend != candidate.backend {
            summary.push_reason("strict_backend_mismatch");
        }
        if options.strict_model_script && baseline.model_script != candidate.model_script {
            summary.push_reason("strict_model_script_mismatch");
        }
        if options.strict_policy_version
            && baseline.toolchain.policy_version != candidate.toolchain.policy_version
        {
            summary.push_reason("strict_policy_version_mismatch");
        }
    }

    if candidate.status != RunOutcome::Success {
        summary.push_reason("status_not_success");
    }
    if candidate.gate != Gate::Pass {
        summary.push_reason("gate_not_pass");
    }
    if baseline.check_ok && !candidate.check_ok {
        summary.push_reason("check_regression");
    }
    if baseline.simulate_ok && !candidate.simulate_ok {
        summary.push_reason("simulate_regression");
    }

    let base_runtime = baseline.metrics.runtime_seconds;
    let cand_runtime = candidate.metrics.runtime_seconds;
    if base_runtime > 0.0 {
        let allowed = base_runtime * (1.0 + options.runtime_threshold);
        if cand_runtime > allowed {
            summary.push_reason(format!("runtime_regression:{cand_runtime:.4}s>{allowed:.4}s"));
        }
    }

    let (findings, checker_reasons) = run_checkers(
        baseline,
        candidate,
        options.checkers.as_deref(),
        &options.checker_config,
    )?;
    for reason in checker_reasons {
        summary.push_reason(reason);
    }
    summary.findings = findings;
    summary.checkers = crate::checkers::resolve_checker_names(
        options.checkers.as_deref(),
        &options.checker_config,
    );

    if !summary.reasons.is_empty() {
        summary.decision = Decision::Fail;
    }
    Ok(summary)
}

/// Builds the summary emitted when the baseline cannot be resolved.
#[must_use]
pub fn baseline_missing_summary(options: &RegressionOptions) -> RegressionSummary {
    RegressionSummary {
        decision: Decision::Fail,
        proposal_id: None,
        risk_level: None,
        strict: options.strict,
        strict_model_script: options.strict_model_script,
        strict_policy_version: options.strict_policy_version,
        baseline_run_id: None,
        candidate_run_id: None,
        runtime_threshold: options.runtime_threshold,
        baseline_runtime_seconds: 0.0,
        candidate_runtime_seconds: 0.0,
        reasons: vec!["baseline_missing".to_string()],
        policy_reasons: Vec::new(),
        required_human_checks: Vec::new(),
        findings: Vec::new(),
        checkers: Vec::new(),
        checker_config: options.checker_config.clone(),
        policy_path: None,
        policy_version: None,
        proposal_expected_backend: None,
        proposal_expected_model_script: None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::evidence::EvidenceArtifacts;
    use crate::core::evidence::FailureType;
    use crate::core::evidence::Metrics;
    use crate::core::evidence::Toolchain;

    fn evidence(runtime: f64, events: u64) -> Evidence {
        Evidence {
            schema_version: "0.1.0".to_string(),
            run_id: format!("run-{runtime}"),
            timestamp_utc: "2026-01-01T00:00:00Z".to_string(),
            backend: "mock".to_string(),
            model_script: Some("demos/minimal_probe.mos".to_string()),
            status: RunOutcome::Success,
            failure_type: FailureType::None,
            gate: Gate::Pass,
            check_ok: true,
            simulate_ok: true,
            metrics: Metrics {
                runtime_seconds: runtime,
                events,
                ..Metrics::default()
            },
            exit_code: 0,
            toolchain: Toolchain::default(),
            artifacts: EvidenceArtifacts::default(),
            proposal_id: None,
        }
    }

    #[test]
    fn clean_pair_is_pass() {
        let summary =
            compare_evidence(&evidence(1.0, 10), &evidence(1.05, 10), &RegressionOptions::default())
                .expect("compare");
        assert_eq!(summary.decision, Decision::Pass);
        assert!(summary.reasons.is_empty());
    }

    #[test]
    fn runtime_regression_reason_carries_values() {
        let summary =
            compare_evidence(&evidence(1.0, 10), &evidence(1.3, 10), &RegressionOptions::default())
                .expect("compare");
        assert_eq!(summary.decision, Decision::Fail);
        assert_eq!(summary.reasons, vec!["runtime_regression:1.3000s>1.2000s"]);
    }

    #[test]
    fn strict_mismatches_lead_reason_list() {
        let mut candidate = evidence(5.0, 10);
        candidate.backend = "openmodelica".to_string();
        candidate.schema_version = "0.2.0".to_string();
        let options = RegressionOptions {
            strict: true,
            strict_model_script: true,
            ..RegressionOptions::default()
        };
        let summary = compare_evidence(&evidence(1.0, 10), &candidate, &options).expect("compare");
        assert_eq!(summary.reasons[0], "strict_schema_version_mismatch");
        assert_eq!(summary.reasons[1], "strict_backend_mismatch");
    }

    #[test]
    fn structural_gates_precede_checker_reasons() {
        let mut candidate = evidence(5.0, 100);
        candidate.status = RunOutcome::Failure;
        candidate.failure_type = FailureType::SimulateError;
        candidate.gate = Gate::Fail;
        candidate.simulate_ok = false;
        let summary =
            compare_evidence(&evidence(1.0, 10), &candidate, &RegressionOptions::default())
                .expect("compare");
        let status_idx =
            summary.reasons.iter().position(|r| r == "status_not_success").expect("status");
        let perf_idx = summary
            .reasons
            .iter()
            .position(|r| r == "performance_regression_detected")
            .expect("perf");
        assert!(status_idx < perf_idx);
        assert!(summary.reasons.contains(&"gate_not_pass".to_string()));
        assert!(summary.reasons.contains(&"simulate_regression".to_string()));
    }

    #[test]
    fn comparison_is_deterministic() {
        let baseline = evidence(1.0, 10);
        let candidate = evidence(1.9, 25);
        let options = RegressionOptions {
            checker_config: serde_json::from_value(json!({
                "performance_regression": {"max_ratio": 1.5},
            }))
            .expect("config"),
            ..RegressionOptions::default()
        };
        let a = compare_evidence(&baseline, &candidate, &options).expect("compare");
        let b = compare_evidence(&baseline, &candidate, &options).expect("compare");
        let ja = serde_json::to_vec(&a).expect("serialize");
        let jb = serde_json::to_vec(&b).expect("serialize");
        assert_eq!(ja, jb);
    }

    #[test]
    fn rerunning_with_emitted_candidate_is_idempotent() {
        let baseline = evidence(1.0, 10);
        let candidate = evidence(1.6, 16);
        let options = RegressionOptions::default();
        let first = compare_evidence(&baseline, &candidate, &options).expect("compare");
        let second = compare_evidence(&baseline, &candidate, &options).expect("compare");
        assert_eq!(first.decision, second.decision);
        assert_eq!(first.reasons, second.reasons);
    }

    #[test]
    fn baseline_missing_summary_fails() {
        let summary = baseline_missing_summary(&RegressionOptions::default());
        assert_eq!(summary.decision, Decision::Fail);
        assert_eq!(summary.reasons, vec!["baseline_missing"]);
    }
}
