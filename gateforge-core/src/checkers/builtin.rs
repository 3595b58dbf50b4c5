// gateforge-core/src/checkers/builtin.rs
// ============================================================================
// Module: GateForge Built-in Checkers
// Description: The built-in regression checker implementations.
// Purpose: Detect timeouts, instability, and metric regressions.
// Dependencies: crate::checkers, crate::core
// ============================================================================

//! ## Overview
//! Seven built-in checkers evaluated in a fixed order: timeout, nan_inf,
//! performance_regression, event_explosion, steady_state_regression,
//! control_behavior_regression, invariant_guard. Each is a pure function of
//! the evidence pair and its configuration block.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::checkers::Checker;
use crate::checkers::CheckerContext;
use crate::checkers::Finding;
use crate::core::evidence::FailureType;
use crate::core::invariant::InvariantKind;
use crate::core::invariant::MonotonicDirection;
use crate::core::invariant::PhysicalInvariant;

// ============================================================================
// SECTION: Registry Order
// ============================================================================

/// Built-in checker names in emission order.
pub const CHECKER_ORDER: &[&str] = &[
    "timeout",
    "nan_inf",
    "performance_regression",
    "event_explosion",
    "steady_state_regression",
    "control_behavior_regression",
    "invariant_guard",
];

/// Returns the built-in checker registry in emission order.
#[must_use]
pub(crate) fn registry() -> &'static [&'static dyn Checker] {
    static REGISTRY: [&dyn Checker; 7] = [
        &TimeoutChecker,
        &NanInfChecker,
        &PerformanceRegressionChecker,
        &EventExplosionChecker,
        &SteadyStateRegressionChecker,
        &ControlBehaviorRegressionChecker,
        &InvariantGuardChecker,
    ];
    &REGISTRY
}

// ============================================================================
// SECTION: Timeout
// ============================================================================

/// Flags candidates that hit a wall-clock timeout.
struct TimeoutChecker;

impl Checker for TimeoutChecker {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn check(&self, ctx: &CheckerContext<'_>) -> Vec<Finding> {
        let timed_out = ctx.candidate.failure_type == FailureType::Timeout;
        let over_budget = ctx
            .config_f64_opt("timeout", "max_runtime_seconds")
            .is_some_and(|max| ctx.candidate.metrics.runtime_seconds > max);
        if timed_out || over_budget {
            return vec![Finding::error(
                "timeout",
                "candidate_timeout_detected",
                "Candidate execution hit the wall-clock timeout.",
            )];
        }
        Vec::new()
    }
}

// ============================================================================
// SECTION: NaN / Inf
// ============================================================================

/// Flags NaN/Inf instability in candidate output.
struct NanInfChecker;

impl Checker for NanInfChecker {
    fn name(&self) -> &'static str {
        "nan_inf"
    }

    fn check(&self, ctx: &CheckerContext<'_>) -> Vec<Finding> {
        let log = ctx
            .candidate
            .artifacts
            .log_excerpt
            .as_deref()
            .unwrap_or("")
            .to_ascii_lowercase();
        if ctx.candidate.failure_type == FailureType::NanInf
            || log.contains("nan")
            || log.contains("inf")
        {
            return vec![Finding::error(
                "nan_inf",
                "nan_or_inf_detected",
                "Candidate output indicates NaN/Inf instability.",
            )];
        }
        Vec::new()
    }
}

// ============================================================================
// SECTION: Performance Regression
// ============================================================================

/// Flags candidates whose runtime exceeds a baseline ratio.
struct PerformanceRegressionChecker;

impl Checker for PerformanceRegressionChecker {
    fn name(&self) -> &'static str {
        "performance_regression"
    }

    fn check(&self, ctx: &CheckerContext<'_>) -> Vec<Finding> {
        let base = ctx.baseline.metrics.runtime_seconds;
        let cand = ctx.candidate.metrics.runtime_seconds;
        let ratio = ctx.config_f64("performance_regression", "max_ratio", 1.5);
        if base <= 0.0 {
            return Vec::new();
        }
        if cand > base * ratio {
            return vec![Finding::error(
                "performance_regression",
                "performance_regression_detected",
                format!("Candidate runtime {cand:.4}s exceeds {ratio:.2}x baseline {base:.4}s."),
            )];
        }
        Vec::new()
    }
}

// ============================================================================
// SECTION: Event Explosion
// ============================================================================

/// Flags candidates with an exploding event count.
struct EventExplosionChecker;

impl Checker for EventExplosionChecker {
    fn name(&self) -> &'static str {
        "event_explosion"
    }

    fn check(&self, ctx: &CheckerContext<'_>) -> Vec<Finding> {
        let base = ctx.baseline.metrics.events;
        let cand = ctx.candidate.metrics.events;
        let ratio = ctx.config_f64("event_explosion", "max_ratio", 2.0);
        let abs_zero = ctx.config_f64("event_explosion", "abs_threshold_if_baseline_zero", 100.0);
        if base > 0 {
            if (cand as f64) > (base as f64) * ratio {
                return vec![Finding::error(
                    "event_explosion",
                    "event_explosion_detected",
                    format!("Candidate events {cand} exceeds {ratio:.2}x baseline {base}."),
                )];
            }
            return Vec::new();
        }
        if (cand as f64) >= abs_zero {
            return vec![Finding::error(
                "event_explosion",
                "event_explosion_detected",
                format!(
                    "Candidate events {cand} unexpectedly high from zero baseline \
                     (threshold {abs_zero})."
                ),
            )];
        }
        Vec::new()
    }
}

// ============================================================================
// SECTION: Steady-State Regression
// ============================================================================

/// Flags steady-state error drift beyond an absolute delta.
struct SteadyStateRegressionChecker;

impl Checker for SteadyStateRegressionChecker {
    fn name(&self) -> &'static str {
        "steady_state_regression"
    }

    fn check(&self, ctx: &CheckerContext<'_>) -> Vec<Finding> {
        let max_abs_delta = ctx.config_f64("steady_state_regression", "max_abs_delta", 0.05);
        let (Some(base), Some(cand)) = (
            ctx.baseline.metrics.steady_state_error,
            ctx.candidate.metrics.steady_state_error,
        ) else {
            return vec![Finding::info(
                "steady_state_regression",
                "steady_state_regression_metric_missing",
                "steady_state_error is absent on baseline or candidate.",
            )];
        };
        let delta = (cand - base).abs();
        if delta > max_abs_delta {
            let mut evidence = Map::new();
            evidence.insert("baseline.metrics.steady_state_error".to_string(), json!(base));
            evidence.insert("candidate.metrics.steady_state_error".to_string(), json!(cand));
            evidence.insert("max_abs_delta".to_string(), json!(max_abs_delta));
            return vec![
                Finding::error(
                    "steady_state_regression",
                    "steady_state_regression_detected",
                    format!(
                        "Steady-state error delta {delta:.4} exceeds threshold \
                         {max_abs_delta:.4} (baseline={base:.4}, candidate={cand:.4})."
                    ),
                )
                .with_evidence(evidence),
            ];
        }
        Vec::new()
    }
}

// ============================================================================
// SECTION: Control Behavior Regression
// ============================================================================

/// Flags overshoot, settling-time, and steady-state control regressions.
struct ControlBehaviorRegressionChecker;

impl Checker for ControlBehaviorRegressionChecker {
    fn name(&self) -> &'static str {
        "control_behavior_regression"
    }

    fn check(&self, ctx: &CheckerContext<'_>) -> Vec<Finding> {
        const NAME: &str = "control_behavior_regression";
        let max_overshoot = ctx.config_f64(NAME, "max_overshoot_abs_delta", 0.1);
        let max_settling_ratio = ctx.config_f64(NAME, "max_settling_time_ratio", 1.5);
        let max_steady_delta = ctx.config_f64(NAME, "max_steady_state_abs_delta", 0.05);

        let mut findings = Vec::new();

        match (ctx.baseline.metrics.overshoot, ctx.candidate.metrics.overshoot) {
            (Some(base), Some(cand)) => {
                let delta = (cand - base).abs();
                if delta > max_overshoot {
                    findings.push(Finding::error(
                        NAME,
                        "overshoot_regression_detected",
                        format!(
                            "Overshoot delta {delta:.4} exceeds threshold {max_overshoot:.4} \
                             (baseline={base:.4}, candidate={cand:.4})."
                        ),
                    ));
                }
            }
            _ => findings.push(Finding::info(
                NAME,
                "control_behavior_regression_metric_missing",
                "overshoot is absent on baseline or candidate.",
            )),
        }

        match (ctx.baseline.metrics.settling_time, ctx.candidate.metrics.settling_time) {
            (Some(base), Some(cand)) => {
                if base > 0.0 && cand > base * max_settling_ratio {
                    findings.push(Finding::error(
                        NAME,
                        "settling_time_regression_detected",
                        format!(
                            "Settling time {cand:.4}s exceeds {max_settling_ratio:.2}x \
                             baseline {base:.4}s."
                        ),
                    ));
                }
            }
            _ => findings.push(Finding::info(
                NAME,
                "control_behavior_regression_metric_missing",
                "settling_time is absent on baseline or candidate.",
            )),
        }

        match (
            ctx.baseline.metrics.steady_state_error,
            ctx.candidate.metrics.steady_state_error,
        ) {
            (Some(base), Some(cand)) => {
                let delta = (cand - base).abs();
                if delta > max_steady_delta {
                    findings.push(Finding::error(
                        NAME,
                        "steady_state_regression_detected",
                        format!(
                            "Steady-state error delta {delta:.4} exceeds threshold \
                             {max_steady_delta:.4} (baseline={base:.4}, candidate={cand:.4})."
                        ),
                    ));
                }
            }
            _ => findings.push(Finding::info(
                NAME,
                "control_behavior_regression_metric_missing",
                "steady_state_error is absent on baseline or candidate.",
            )),
        }

        findings
    }
}

// ============================================================================
// SECTION: Invariant Guard
// ============================================================================

/// Enforces declared physical invariants against candidate metrics.
///
/// This checker fails closed: a missing metric is an error finding, not an
/// informational one.
struct InvariantGuardChecker;

impl Checker for InvariantGuardChecker {
    fn name(&self) -> &'static str {
        "invariant_guard"
    }

    fn check(&self, ctx: &CheckerContext<'_>) -> Vec<Finding> {
        const NAME: &str = "invariant_guard";
        let Some(invariants) = ctx.config_value(NAME, "invariants") else {
            return Vec::new();
        };
        let invariants: Vec<PhysicalInvariant> =
            match serde_json::from_value(invariants.clone()) {
                Ok(list) => list,
                Err(err) => {
                    return vec![Finding::error(
                        NAME,
                        "invariant_guard_config_invalid",
                        format!("invariants config did not parse: {err}"),
                    )];
                }
            };

        let mut findings = Vec::new();
        for invariant in &invariants {
            let Some(cand) = ctx.candidate.metrics.get(&invariant.metric) else {
                findings.push(Finding::error(
                    NAME,
                    "invariant_guard_metric_missing",
                    format!("candidate metric {} is absent", invariant.metric),
                ));
                continue;
            };
            match invariant.kind {
                InvariantKind::Range => {
                    let min = invariant.min.unwrap_or(f64::NEG_INFINITY);
                    let max = invariant.max.unwrap_or(f64::INFINITY);
                    if cand < min || cand > max {
                        findings.push(range_violation(invariant, cand, min, max));
                    }
                }
                InvariantKind::Monotonic => {
                    let Some(base) = ctx.baseline.metrics.get(&invariant.metric) else {
                        findings.push(Finding::error(
                            NAME,
                            "invariant_guard_metric_missing",
                            format!("baseline metric {} is absent", invariant.metric),
                        ));
                        continue;
                    };
                    let direction =
                        invariant.direction.unwrap_or(MonotonicDirection::NonIncreasing);
                    let violated = match direction {
                        MonotonicDirection::NonIncreasing => cand > base,
                        MonotonicDirection::NonDecreasing => cand < base,
                    };
                    if violated {
                        findings.push(monotonic_violation(invariant, base, cand, direction));
                    }
                }
                InvariantKind::BoundedDelta => {
                    let Some(base) = ctx.baseline.metrics.get(&invariant.metric) else {
                        findings.push(Finding::error(
                            NAME,
                            "invariant_guard_metric_missing",
                            format!("baseline metric {} is absent", invariant.metric),
                        ));
                        continue;
                    };
                    let max_delta = invariant.max_delta.unwrap_or(f64::INFINITY);
                    let delta = (cand - base).abs();
                    if delta > max_delta {
                        findings.push(bounded_delta_violation(invariant, delta, max_delta));
                    }
                }
            }
        }
        findings
    }
}

fn range_violation(invariant: &PhysicalInvariant, cand: f64, min: f64, max: f64) -> Finding {
    let mut evidence = Map::new();
    evidence.insert("candidate_value".to_string(), json!(cand));
    evidence.insert("min".to_string(), json!(min));
    evidence.insert("max".to_string(), json!(max));
    Finding::error(
        "invariant_guard",
        invariant.violation_reason(),
        format!(
            "Metric {} = {cand:.4} escaped declared range [{min:.4}, {max:.4}].",
            invariant.metric
        ),
    )
    .with_evidence(evidence)
}

fn monotonic_violation(
    invariant: &PhysicalInvariant,
    base: f64,
    cand: f64,
    direction: MonotonicDirection,
) -> Finding {
    let label = match direction {
        MonotonicDirection::NonIncreasing => "non_increasing",
        MonotonicDirection::NonDecreasing => "non_decreasing",
    };
    let mut evidence = Map::new();
    evidence.insert("baseline_value".to_string(), json!(base));
    evidence.insert("candidate_value".to_string(), json!(cand));
    evidence.insert("direction".to_string(), json!(label));
    Finding::error(
        "invariant_guard",
        invariant.violation_reason(),
        format!(
            "Metric {} moved against declared {label} direction \
             (baseline={base:.4}, candidate={cand:.4}).",
            invariant.metric
        ),
    )
    .with_evidence(evidence)
}

fn bounded_delta_violation(invariant: &PhysicalInvariant, delta: f64, max_delta: f64) -> Finding {
    let mut evidence = Map::new();
    evidence.insert("delta".to_string(), json!(delta));
    evidence.insert("max_delta".to_string(), json!(max_delta));
    Finding::error(
        "invariant_guard",
        invariant.violation_reason(),
        format!(
            "Metric {} delta {delta:.4} exceeds declared bound {max_delta:.4}.",
            invariant.metric
        ),
    )
    .with_evidence(evidence)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::checkers::run_checkers;
    use crate::core::evidence::Evidence;
    use crate::core::evidence::EvidenceArtifacts;
    use crate::core::evidence::FailureType;
    use crate::core::evidence::Gate;
    use crate::core::evidence::Metrics;
    use crate::core::evidence::RunOutcome;
    use crate::core::evidence::Toolchain;

    fn evidence(runtime: f64, events: u64) -> Evidence {
        Evidence {
            schema_version: "0.1.0".to_string(),
            run_id: "run".to_string(),
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
    fn clean_pair_produces_no_reasons() {
        let baseline = evidence(1.0, 10);
        let candidate = evidence(1.05, 11);
        let config = serde_json::Map::new();
        let (_, reasons) = run_checkers(&baseline, &candidate, None, &config).expect("checkers");
        assert!(reasons.is_empty());
    }

    #[test]
    fn performance_and_event_explosion_fire_together() {
        let baseline = evidence(1.0, 10);
        let candidate = evidence(1.6, 16);
        let config = serde_json::from_value(json!({
            "performance_regression": {"max_ratio": 1.5},
            "event_explosion": {"max_ratio": 1.5},
        }))
        .expect("config");
        let (_, reasons) = run_checkers(&baseline, &candidate, None, &config).expect("checkers");
        assert_eq!(
            reasons,
            vec!["performance_regression_detected", "event_explosion_detected"]
        );
    }

    #[test]
    fn timeout_failure_type_triggers() {
        let baseline = evidence(1.0, 10);
        let mut candidate = evidence(1.0, 10);
        candidate.status = RunOutcome::Failure;
        candidate.failure_type = FailureType::Timeout;
        candidate.gate = Gate::Fail;
        candidate.check_ok = false;
        candidate.simulate_ok = false;
        let config = serde_json::Map::new();
        let (_, reasons) = run_checkers(&baseline, &candidate, None, &config).expect("checkers");
        assert!(reasons.contains(&"candidate_timeout_detected".to_string()));
    }

    #[test]
    fn runtime_budget_triggers_timeout() {
        let baseline = evidence(1.0, 10);
        let candidate = evidence(9.0, 10);
        let config = serde_json::from_value(json!({
            "timeout": {"max_runtime_seconds": 5.0},
        }))
        .expect("config");
        let selection = vec!["timeout".to_string()];
        let (_, reasons) =
            run_checkers(&baseline, &candidate, Some(&selection), &config).expect("checkers");
        assert_eq!(reasons, vec!["candidate_timeout_detected"]);
    }

    #[test]
    fn nan_log_excerpt_triggers() {
        let baseline = evidence(1.0, 10);
        let mut candidate = evidence(1.0, 10);
        candidate.artifacts.log_excerpt = Some("value became NaN at t=0.3".to_string());
        let config = serde_json::Map::new();
        let selection = vec!["nan_inf".to_string()];
        let (_, reasons) =
            run_checkers(&baseline, &candidate, Some(&selection), &config).expect("checkers");
        assert_eq!(reasons, vec!["nan_or_inf_detected"]);
    }

    #[test]
    fn event_explosion_from_zero_baseline_uses_absolute_threshold() {
        let baseline = evidence(1.0, 0);
        let candidate = evidence(1.0, 150);
        let config = serde_json::Map::new();
        let selection = vec!["event_explosion".to_string()];
        let (_, reasons) =
            run_checkers(&baseline, &candidate, Some(&selection), &config).expect("checkers");
        assert_eq!(reasons, vec!["event_explosion_detected"]);
    }

    #[test]
    fn missing_steady_state_metric_is_informational() {
        let baseline = evidence(1.0, 10);
        let candidate = evidence(1.0, 10);
        let config = serde_json::Map::new();
        let selection = vec!["steady_state_regression".to_string()];
        let (findings, reasons) =
            run_checkers(&baseline, &candidate, Some(&selection), &config).expect("checkers");
        assert!(reasons.is_empty());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].reason, "steady_state_regression_metric_missing");
    }

    #[test]
    fn control_behavior_detects_all_three_regressions() {
        let mut baseline = evidence(1.0, 10);
        baseline.metrics.overshoot = Some(0.05);
        baseline.metrics.settling_time = Some(2.0);
        baseline.metrics.steady_state_error = Some(0.01);
        let mut candidate = evidence(1.0, 10);
        candidate.metrics.overshoot = Some(0.30);
        candidate.metrics.settling_time = Some(4.0);
        candidate.metrics.steady_state_error = Some(0.10);
        let config = serde_json::Map::new();
        let selection = vec!["control_behavior_regression".to_string()];
        let (_, reasons) =
            run_checkers(&baseline, &candidate, Some(&selection), &config).expect("checkers");
        assert_eq!(
            reasons,
            vec![
                "overshoot_regression_detected",
                "settling_time_regression_detected",
                "steady_state_regression_detected",
            ]
        );
    }

    #[test]
    fn invariant_guard_flags_all_declared_violations() {
        let mut baseline = evidence(1.0, 10);
        baseline.metrics.steady_state_error = Some(0.02);
        baseline.metrics.energy = Some(10.0);
        baseline.metrics.overshoot = Some(0.05);
        let mut candidate = evidence(1.0, 10);
        candidate.metrics.steady_state_error = Some(0.15);
        candidate.metrics.energy = Some(12.0);
        candidate.metrics.overshoot = Some(0.30);
        let config = serde_json::from_value(json!({
            "invariant_guard": {
                "invariants": [
                    {"type": "range", "metric": "steady_state_error", "min": 0.0, "max": 0.08},
                    {"type": "monotonic", "metric": "energy", "direction": "non_increasing"},
                    {"type": "bounded_delta", "metric": "overshoot", "max_delta": 0.1},
                ],
            },
        }))
        .expect("config");
        let selection = vec!["invariant_guard".to_string()];
        let (_, reasons) =
            run_checkers(&baseline, &candidate, Some(&selection), &config).expect("checkers");
        assert_eq!(
            reasons,
            vec![
                "physical_invariant_range_violated:steady_state_error",
                "physical_invariant_monotonic_violated:energy",
                "physical_invariant_bounded_delta_violated:overshoot",
            ]
        );
    }

    #[test]
    fn runtime_disable_removes_checker() {
        let baseline = evidence(1.0, 10);
        let candidate = evidence(5.0, 10);
        let config = serde_json::from_value(json!({
            "_runtime": {"disable": ["performance_regression"]},
        }))
        .expect("config");
        let (_, reasons) = run_checkers(&baseline, &candidate, None, &config).expect("checkers");
        assert!(!reasons.contains(&"performance_regression_detected".to_string()));
    }
}
