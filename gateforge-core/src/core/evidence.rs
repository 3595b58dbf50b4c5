// gateforge-core/src/core/evidence.rs
// ============================================================================
// Module: GateForge Evidence Model
// Description: Structured record of one backend execution.
// Purpose: Provide the evidence contract consumed by regression and policy.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Evidence is the output of a single backend run: status, failure taxonomy,
//! structural gate, and the metric surface the checker suite compares.
//! Invariants are enforced before an evidence artifact may be written:
//! `gate=PASS ⇔ status=success ∧ check_ok ∧ simulate_ok` and
//! `failure_type=none ⇔ status=success`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Outcome and Gate
// ============================================================================

/// Terminal outcome of a backend execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Backend completed its requested actions.
    Success,
    /// Backend failed or was aborted.
    Failure,
}

/// Structural gate verdict for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    /// Run is structurally sound.
    #[serde(rename = "PASS")]
    Pass,
    /// Run is structurally broken.
    #[serde(rename = "FAIL")]
    Fail,
}

// ============================================================================
// SECTION: Failure Taxonomy
// ============================================================================

/// Failure classification for a backend execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// No failure occurred.
    None,
    /// Wall-clock timeout was exceeded.
    Timeout,
    /// Output contained NaN or Inf values.
    NanInf,
    /// Required tool binary was missing.
    ToolMissing,
    /// Model compilation failed.
    CompileError,
    /// Model script could not be parsed.
    ScriptParseError,
    /// Model check stage failed.
    ModelCheckError,
    /// Simulation stage failed.
    SimulateError,
    /// Container runtime was unavailable or misbehaved.
    DockerError,
    /// Backend configuration was invalid.
    ConfigError,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Timeout => "timeout",
            Self::NanInf => "nan_inf",
            Self::ToolMissing => "tool_missing",
            Self::CompileError => "compile_error",
            Self::ScriptParseError => "script_parse_error",
            Self::ModelCheckError => "model_check_error",
            Self::SimulateError => "simulate_error",
            Self::DockerError => "docker_error",
            Self::ConfigError => "config_error",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Metric surface produced by one run.
///
/// Named metrics cover the built-in checkers; any additional backend metrics
/// round-trip through `extra` without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Metrics {
    /// Wall-clock runtime in seconds.
    pub runtime_seconds: f64,
    /// Discrete event count.
    pub events: u64,
    /// Peak overshoot of the controlled variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overshoot: Option<f64>,
    /// Settling time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settling_time: Option<f64>,
    /// Steady-state error magnitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steady_state_error: Option<f64>,
    /// Accumulated energy measure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    /// Backend-specific metrics preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metrics {
    /// Looks up a metric by name, named fields first, then `extra`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "runtime_seconds" => Some(self.runtime_seconds),
            "events" => Some(self.events as f64),
            "overshoot" => self.overshoot,
            "settling_time" => self.settling_time,
            "steady_state_error" => self.steady_state_error,
            "energy" => self.energy,
            _ => self.extra.get(name).and_then(Value::as_f64),
        }
    }
}

// ============================================================================
// SECTION: Toolchain
// ============================================================================

/// Toolchain provenance recorded on each evidence artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Toolchain {
    /// Backend version string when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_version: Option<String>,
    /// Container image used, when containerized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    /// Policy profile active when the evidence was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_profile: Option<String>,
    /// Policy version active when the evidence was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
}

/// Auxiliary artifacts captured alongside a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EvidenceArtifacts {
    /// Truncated log excerpt for triage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_excerpt: Option<String>,
}

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Structured record of one backend execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Evidence schema version.
    pub schema_version: String,
    /// Unique run identifier.
    pub run_id: String,
    /// UTC timestamp of the run (ISO-8601).
    pub timestamp_utc: String,
    /// Backend that produced the evidence.
    pub backend: String,
    /// Model script executed, when applicable.
    #[serde(default)]
    pub model_script: Option<String>,
    /// Terminal outcome of the run.
    pub status: RunOutcome,
    /// Failure classification.
    pub failure_type: FailureType,
    /// Structural gate verdict.
    pub gate: Gate,
    /// Whether the model check stage succeeded.
    pub check_ok: bool,
    /// Whether the simulate stage succeeded.
    pub simulate_ok: bool,
    /// Metric surface.
    pub metrics: Metrics,
    /// Backend process exit code.
    pub exit_code: i64,
    /// Toolchain provenance.
    #[serde(default)]
    pub toolchain: Toolchain,
    /// Auxiliary artifacts.
    #[serde(default)]
    pub artifacts: EvidenceArtifacts,
    /// Proposal this evidence was produced for, when proposal-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
}

/// Errors raised when an evidence artifact violates its invariants.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// Gate verdict disagrees with the structural flags.
    #[error("gate={gate:?} is inconsistent with status/check_ok/simulate_ok")]
    GateInconsistent {
        /// Offending gate verdict.
        gate: Gate,
    },
    /// Failure type disagrees with the run outcome.
    #[error("failure_type={failure_type} is inconsistent with status")]
    FailureTypeInconsistent {
        /// Offending failure type.
        failure_type: FailureType,
    },
    /// A metric carries a non-finite or negative value.
    #[error("metric {name} is invalid: {value}")]
    InvalidMetric {
        /// Metric name.
        name: String,
        /// Offending value.
        value: f64,
    },
}

impl Evidence {
    /// Derives the structural gate verdict from run flags.
    #[must_use]
    pub const fn derive_gate(status: RunOutcome, check_ok: bool, simulate_ok: bool) -> Gate {
        match status {
            RunOutcome::Success if check_ok && simulate_ok => Gate::Pass,
            _ => Gate::Fail,
        }
    }

    /// Validates the evidence invariants.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError`] when the gate or failure type contradicts
    /// the structural flags, or when a metric is invalid.
    pub fn validate(&self) -> Result<(), EvidenceError> {
        let expected = Self::derive_gate(self.status, self.check_ok, self.simulate_ok);
        if self.gate != expected {
            return Err(EvidenceError::GateInconsistent {
                gate: self.gate,
            });
        }
        let failure_none = matches!(self.failure_type, FailureType::None);
        let success = matches!(self.status, RunOutcome::Success);
        if failure_none != success {
            return Err(EvidenceError::FailureTypeInconsistent {
                failure_type: self.failure_type,
            });
        }
        if !self.metrics.runtime_seconds.is_finite() || self.metrics.runtime_seconds < 0.0 {
            return Err(EvidenceError::InvalidMetric {
                name: "runtime_seconds".to_string(),
                value: self.metrics.runtime_seconds,
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Evidence {
        Evidence {
            schema_version: "0.1.0".to_string(),
            run_id: "run-1".to_string(),
            timestamp_utc: "2026-01-01T00:00:00Z".to_string(),
            backend: "mock".to_string(),
            model_script: Some("demos/minimal_probe.mos".to_string()),
            status: RunOutcome::Success,
            failure_type: FailureType::None,
            gate: Gate::Pass,
            check_ok: true,
            simulate_ok: true,
            metrics: Metrics {
                runtime_seconds: 1.0,
                events: 10,
                ..Metrics::default()
            },
            exit_code: 0,
            toolchain: Toolchain::default(),
            artifacts: EvidenceArtifacts::default(),
            proposal_id: None,
        }
    }

    #[test]
    fn gate_pass_requires_success_and_both_flags() {
        assert_eq!(Evidence::derive_gate(RunOutcome::Success, true, true), Gate::Pass);
        assert_eq!(Evidence::derive_gate(RunOutcome::Success, false, true), Gate::Fail);
        assert_eq!(Evidence::derive_gate(RunOutcome::Success, true, false), Gate::Fail);
        assert_eq!(Evidence::derive_gate(RunOutcome::Failure, true, true), Gate::Fail);
    }

    #[test]
    fn validate_rejects_gate_mismatch() {
        let mut evidence = sample();
        evidence.check_ok = false;
        assert!(matches!(evidence.validate(), Err(EvidenceError::GateInconsistent { .. })));
    }

    #[test]
    fn validate_rejects_failure_type_mismatch() {
        let mut evidence = sample();
        evidence.failure_type = FailureType::Timeout;
        assert!(matches!(
            evidence.validate(),
            Err(EvidenceError::FailureTypeInconsistent { .. })
        ));
    }

    #[test]
    fn metrics_lookup_covers_named_and_extra() {
        let mut metrics = Metrics {
            runtime_seconds: 1.5,
            events: 3,
            steady_state_error: Some(0.01),
            ..Metrics::default()
        };
        metrics.extra.insert("peak_torque".to_string(), serde_json::json!(4.5));
        assert_eq!(metrics.get("runtime_seconds"), Some(1.5));
        assert_eq!(metrics.get("events"), Some(3.0));
        assert_eq!(metrics.get("steady_state_error"), Some(0.01));
        assert_eq!(metrics.get("peak_torque"), Some(4.5));
        assert_eq!(metrics.get("missing"), None);
    }
}
