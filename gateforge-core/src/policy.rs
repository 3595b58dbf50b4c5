// gateforge-core/src/policy.rs
// ============================================================================
// Module: GateForge Policy Overlay
// Description: Declarative mapping from reasons and risk level to a decision.
// Purpose: Collapse regression reasons into PASS / NEEDS_REVIEW / FAIL.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! The policy overlay is a pure function of `(reasons, risk_level, policy)`.
//! Policies are declarative tables: a critical-reason list, a reason × risk
//! decision map, and a runtime-only decision map. New reasons are added by
//! editing the policy file, never the overlay logic.
//!
//! Reason lookup normalizes parameterized reasons: an exact key match is
//! tried first, then the segment before the first `:`
//! (`runtime_regression:1.3s>1.0s` matches the key `runtime_regression`).
//!
//! Derivation rules, applied in order, first match wins:
//! 1. Any critical reason ⇒ FAIL.
//! 2. Any reason the policy does not recognize at all (not critical, not
//!    mapped, not runtime-type) ⇒ FAIL on those reasons (fail closed).
//! 3. Mapped reasons contribute decisions; the worst contribution wins.
//! 4. All reasons runtime-type ⇒ the runtime-only decision for the risk.
//! 5. No reasons ⇒ PASS.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::decision::Decision;
use crate::core::decision::RiskLevel;

// ============================================================================
// SECTION: Policy Model
// ============================================================================

/// Per-risk table of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByRisk<T> {
    /// Value for low-risk proposals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<T>,
    /// Value for medium-risk proposals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<T>,
    /// Value for high-risk proposals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<T>,
}

impl<T> Default for ByRisk<T> {
    fn default() -> Self {
        Self {
            low: None,
            medium: None,
            high: None,
        }
    }
}

impl<T> ByRisk<T> {
    /// Returns the value for the given risk level.
    #[must_use]
    pub const fn get(&self, risk: RiskLevel) -> Option<&T> {
        match risk {
            RiskLevel::Low => self.low.as_ref(),
            RiskLevel::Medium => self.medium.as_ref(),
            RiskLevel::High => self.high.as_ref(),
        }
    }
}

/// Human-check templates keyed by risk level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HumanChecks {
    /// Checks attached per risk level.
    #[serde(default)]
    pub by_risk: ByRisk<Vec<String>>,
}

/// Declarative governance policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Policy {
    /// Policy version surfaced on derived artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    /// Reasons that force FAIL at any risk level.
    #[serde(default)]
    pub critical_reasons: Vec<String>,
    /// Decision when the only reasons are runtime regressions.
    #[serde(default)]
    pub runtime_only_policy_by_risk: ByRisk<Decision>,
    /// Decision map indexed by reason then risk.
    #[serde(default)]
    pub reason_to_decision_by_risk: Map<String, Value>,
    /// Human checks attached to NEEDS_REVIEW outcomes.
    #[serde(default)]
    pub required_human_checks: HumanChecks,
    /// Human checks surfaced for dry runs.
    #[serde(default)]
    pub dry_run_human_checks: HumanChecks,
    /// Minimum planner confidence for automatic change application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence_auto_apply: Option<f64>,
    /// Minimum planner confidence for accepting a change plan at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence_accept: Option<f64>,
}

impl Policy {
    /// Looks up the mapped decision for one reason at one risk level.
    ///
    /// Tries the exact reason first, then the parameter-stripped form.
    #[must_use]
    pub fn decision_for_reason(&self, reason: &str, risk: RiskLevel) -> Option<Decision> {
        for key in lookup_keys(reason) {
            if let Some(entry) = self.reason_to_decision_by_risk.get(key) {
                let by_risk: ByRisk<Decision> =
                    serde_json::from_value(entry.clone()).unwrap_or_default();
                if let Some(decision) = by_risk.get(risk) {
                    return Some(*decision);
                }
            }
        }
        None
    }

    /// Returns true when the reason is in the critical list.
    #[must_use]
    pub fn is_critical(&self, reason: &str) -> bool {
        lookup_keys(reason)
            .into_iter()
            .any(|key| self.critical_reasons.iter().any(|c| c == key))
    }
}

/// Candidate lookup keys for a reason: exact, then parameter-stripped.
fn lookup_keys(reason: &str) -> Vec<&str> {
    match reason.split_once(':') {
        Some((prefix, _)) => vec![reason, prefix],
        None => vec![reason],
    }
}

/// Returns true for runtime-type reasons.
fn is_runtime_reason(reason: &str) -> bool {
    reason.starts_with("runtime_regression")
}

// ============================================================================
// SECTION: Overlay Evaluation
// ============================================================================

/// Outcome of the policy overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    /// Collapsed decision.
    pub policy_decision: Decision,
    /// Reasons that drove the decision.
    pub policy_reasons: Vec<String>,
    /// Human checks attached when the decision is NEEDS_REVIEW.
    pub required_human_checks: Vec<String>,
}

/// Evaluates the policy overlay for a reason list at a risk level.
#[must_use]
pub fn evaluate_policy(reasons: &[String], risk: RiskLevel, policy: &Policy) -> PolicyOutcome {
    if reasons.is_empty() {
        return PolicyOutcome {
            policy_decision: Decision::Pass,
            policy_reasons: Vec::new(),
            required_human_checks: Vec::new(),
        };
    }

    // Partition into critical / mapped / runtime-type / unknown buckets.
    let critical: Vec<String> =
        reasons.iter().filter(|r| policy.is_critical(r)).cloned().collect();
    if !critical.is_empty() {
        return outcome(Decision::Fail, critical, risk, policy);
    }

    let mapped: Vec<(String, Decision)> = reasons
        .iter()
        .filter_map(|r| policy.decision_for_reason(r, risk).map(|d| (r.clone(), d)))
        .collect();

    // Fail closed on reasons the policy does not recognize at all. A worse
    // mapped reason never masks an unrecognized one.
    let unknown: Vec<String> = reasons
        .iter()
        .filter(|r| {
            !is_runtime_reason(r) && !mapped.iter().any(|(mapped_reason, _)| mapped_reason == *r)
        })
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return outcome(Decision::Fail, unknown, risk, policy);
    }

    if !mapped.is_empty() {
        let worst = mapped.iter().fold(Decision::Pass, |acc, (_, d)| acc.worst(*d));
        let driving: Vec<String> = if worst == Decision::Pass {
            Vec::new()
        } else {
            mapped.iter().filter(|(_, d)| *d == worst).map(|(r, _)| r.clone()).collect()
        };
        return outcome(worst, driving, risk, policy);
    }

    // Only runtime-type reasons remain.
    let decision = policy
        .runtime_only_policy_by_risk
        .get(risk)
        .copied()
        .unwrap_or(Decision::NeedsReview);
    let driving = if decision == Decision::Pass { Vec::new() } else { reasons.to_vec() };
    outcome(decision, driving, risk, policy)
}

fn outcome(
    decision: Decision,
    policy_reasons: Vec<String>,
    risk: RiskLevel,
    policy: &Policy,
) -> PolicyOutcome {
    let required_human_checks = if decision == Decision::NeedsReview {
        let mut checks = policy
            .required_human_checks
            .by_risk
            .get(risk)
            .cloned()
            .unwrap_or_default();
        if checks.is_empty() {
            checks.push(
                "Human review required: inspect policy_reasons and evidence artifacts \
                 before merge."
                    .to_string(),
            );
        }
        checks
    } else {
        Vec::new()
    };
    PolicyOutcome {
        policy_decision: decision,
        policy_reasons,
        required_human_checks,
    }
}

/// Dry-run human checks for a risk level, with change-set extras.
#[must_use]
pub fn dry_run_human_checks(
    policy: &Policy,
    risk: RiskLevel,
    has_change_set: bool,
) -> Vec<String> {
    let mut checks = policy
        .dry_run_human_checks
        .by_risk
        .get(risk)
        .cloned()
        .unwrap_or_else(|| {
            vec![
                "Confirm proposal backend/model_script mapping before execution.".to_string(),
                "Review baseline selection strategy (auto/index or explicit path).".to_string(),
            ]
        });
    if has_change_set {
        checks.push("Review change-set diff against target files before execution.".to_string());
    }
    // Keep order stable but deduplicate.
    let mut dedup: Vec<String> = Vec::new();
    for item in checks.drain(..) {
        if !dedup.contains(&item) {
            dedup.push(item);
        }
    }
    dedup
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn policy() -> Policy {
        serde_json::from_value(json!({
            "policy_version": "test-1",
            "critical_reasons": [
                "status_not_success",
                "gate_not_pass",
                "baseline_missing",
            ],
            "runtime_only_policy_by_risk": {
                "low": "PASS",
                "medium": "NEEDS_REVIEW",
                "high": "FAIL",
            },
            "reason_to_decision_by_risk": {
                "performance_regression_detected": {
                    "low": "NEEDS_REVIEW",
                    "medium": "NEEDS_REVIEW",
                    "high": "FAIL",
                },
                "physical_invariant_range_violated": {
                    "low": "NEEDS_REVIEW",
                    "medium": "NEEDS_REVIEW",
                    "high": "FAIL",
                },
            },
            "required_human_checks": {
                "by_risk": {
                    "medium": ["Confirm regression thresholds match the risk posture."],
                },
            },
        }))
        .expect("policy")
    }

    fn reasons(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn no_reasons_is_pass() {
        let outcome = evaluate_policy(&[], RiskLevel::High, &policy());
        assert_eq!(outcome.policy_decision, Decision::Pass);
        assert!(outcome.policy_reasons.is_empty());
    }

    #[test]
    fn critical_reason_wins_over_everything() {
        let outcome = evaluate_policy(
            &reasons(&["status_not_success", "performance_regression_detected"]),
            RiskLevel::Low,
            &policy(),
        );
        assert_eq!(outcome.policy_decision, Decision::Fail);
        assert_eq!(outcome.policy_reasons, reasons(&["status_not_success"]));
    }

    #[test]
    fn mapped_reason_worst_contribution_wins() {
        let outcome = evaluate_policy(
            &reasons(&["performance_regression_detected"]),
            RiskLevel::Medium,
            &policy(),
        );
        assert_eq!(outcome.policy_decision, Decision::NeedsReview);
        assert!(!outcome.required_human_checks.is_empty());
    }

    #[test]
    fn parameterized_reason_matches_stripped_key() {
        let outcome = evaluate_policy(
            &reasons(&["physical_invariant_range_violated:steady_state_error"]),
            RiskLevel::High,
            &policy(),
        );
        assert_eq!(outcome.policy_decision, Decision::Fail);
    }

    #[test]
    fn runtime_only_reasons_use_runtime_table() {
        let runtime = reasons(&["runtime_regression:1.3000s>1.2000s"]);
        assert_eq!(
            evaluate_policy(&runtime, RiskLevel::Low, &policy()).policy_decision,
            Decision::Pass
        );
        assert_eq!(
            evaluate_policy(&runtime, RiskLevel::Medium, &policy()).policy_decision,
            Decision::NeedsReview
        );
        assert_eq!(
            evaluate_policy(&runtime, RiskLevel::High, &policy()).policy_decision,
            Decision::Fail
        );
    }

    #[test]
    fn unmapped_reasons_fail_closed() {
        let outcome =
            evaluate_policy(&reasons(&["mystery_reason"]), RiskLevel::Low, &policy());
        assert_eq!(outcome.policy_decision, Decision::Fail);
        assert_eq!(outcome.policy_reasons, reasons(&["mystery_reason"]));
    }

    #[test]
    fn unmapped_reason_mixed_with_mapped_still_fails_closed() {
        let outcome = evaluate_policy(
            &reasons(&["performance_regression_detected", "some_new_unrecognized_reason"]),
            RiskLevel::Low,
            &policy(),
        );
        assert_eq!(outcome.policy_decision, Decision::Fail);
        assert_eq!(outcome.policy_reasons, reasons(&["some_new_unrecognized_reason"]));
    }

    #[test]
    fn unmapped_runtime_reason_mixed_with_mapped_is_not_unknown() {
        // The fixture policy has no `runtime_regression` map entry; the
        // runtime-type reason is still recognized and must not force FAIL.
        let outcome = evaluate_policy(
            &reasons(&[
                "runtime_regression:1.5000s>1.2000s",
                "performance_regression_detected",
            ]),
            RiskLevel::Low,
            &policy(),
        );
        assert_eq!(outcome.policy_decision, Decision::NeedsReview);
        assert_eq!(outcome.policy_reasons, reasons(&["performance_regression_detected"]));
    }

    #[test]
    fn overlay_is_monotone_in_risk() {
        let cases = [
            reasons(&["performance_regression_detected"]),
            reasons(&["runtime_regression:1.5000s>1.2000s"]),
            reasons(&["physical_invariant_range_violated:overshoot"]),
        ];
        for case in &cases {
            let low = evaluate_policy(case, RiskLevel::Low, &policy()).policy_decision;
            let medium = evaluate_policy(case, RiskLevel::Medium, &policy()).policy_decision;
            let high = evaluate_policy(case, RiskLevel::High, &policy()).policy_decision;
            assert!(high.score() <= medium.score());
            assert!(medium.score() <= low.score());
        }
    }

    #[test]
    fn needs_review_always_attaches_checks() {
        let outcome = evaluate_policy(
            &reasons(&["performance_regression_detected"]),
            RiskLevel::Low,
            &policy(),
        );
        assert_eq!(outcome.policy_decision, Decision::NeedsReview);
        assert!(!outcome.required_human_checks.is_empty());
    }
}
