// gateforge-core/src/core/proposal.rs
// ============================================================================
// Module: GateForge Proposal Model
// Description: Declared intent to run a simulation change through the gate.
// Purpose: Provide proposal parsing and strict validation.
// Dependencies: crate::core::{decision, invariant}, crate::checkers, serde
// ============================================================================

//! ## Overview
//! A proposal names the backend, model script, requested actions, and risk
//! level for one governance run, plus optional checker selection, checker
//! configuration, a change-set reference, and physical invariants. The
//! `proposal_id` is stable across every artifact derived from the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::checkers::available_checkers;
use crate::core::decision::RiskLevel;
use crate::core::invariant::PhysicalInvariant;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current proposal schema version.
pub const PROPOSAL_SCHEMA_VERSION: &str = "0.1.0";

/// Backends a proposal may target.
pub const SUPPORTED_BACKENDS: &[&str] = &["mock", "openmodelica", "openmodelica_docker"];

/// Model script suffixes a proposal may reference.
const SUPPORTED_SCRIPT_SUFFIXES: &[&str] = &[".mos", ".fmu"];

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Actions a proposal may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalAction {
    /// Model check only.
    Check,
    /// Execute the simulation.
    Simulate,
    /// Compare candidate vs baseline evidence.
    Regress,
}

impl ProposalAction {
    /// Returns true when the action requires backend execution.
    #[must_use]
    pub const fn is_execution(self) -> bool {
        matches!(self, Self::Check | Self::Simulate)
    }
}

/// Proposal author classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorType {
    /// Authored by a human.
    Human,
    /// Authored by a planner agent.
    Agent,
}

// ============================================================================
// SECTION: Proposal
// ============================================================================

/// Declared intent to run a simulation change through the governance gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposal schema version.
    pub schema_version: String,
    /// Stable proposal identifier.
    pub proposal_id: String,
    /// UTC timestamp of authoring (ISO-8601).
    pub timestamp_utc: String,
    /// Author classification.
    pub author_type: AuthorType,
    /// Target backend.
    pub backend: String,
    /// Target model script.
    pub model_script: String,
    /// Human-readable change summary.
    pub change_summary: String,
    /// Requested pipeline actions.
    pub requested_actions: Vec<ProposalAction>,
    /// Declared risk level.
    pub risk_level: RiskLevel,
    /// Explicit checker selection; absent means all built-ins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkers: Option<Vec<String>>,
    /// Checker configuration, keyed by checker name or `_runtime`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub checker_config: Map<String, Value>,
    /// Optional change-set artifact path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set_path: Option<String>,
    /// Declared physical invariants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub physical_invariants: Vec<PhysicalInvariant>,
    /// Free-form metadata preserved verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Errors raised when a proposal fails validation.
#[derive(Debug, Error)]
pub enum ProposalError {
    /// Schema version is not supported.
    #[error("schema_version must be {expected}, got {actual}")]
    SchemaVersion {
        /// Required version.
        expected: &'static str,
        /// Observed version.
        actual: String,
    },
    /// A required string field is empty.
    #[error("{field} must be a non-empty string")]
    EmptyField {
        /// Offending field name.
        field: &'static str,
    },
    /// Backend is not supported.
    #[error("backend must be one of {SUPPORTED_BACKENDS:?}, got {backend}")]
    UnsupportedBackend {
        /// Offending backend.
        backend: String,
    },
    /// Model script suffix is not supported.
    #[error("model_script must end with .mos or .fmu: {script}")]
    UnsupportedScript {
        /// Offending script path.
        script: String,
    },
    /// Requested actions are empty.
    #[error("requested_actions must be a non-empty list")]
    NoActions,
    /// A named checker is not registered.
    #[error("unsupported checker: {name}")]
    UnknownChecker {
        /// Offending checker name.
        name: String,
    },
    /// Checker config references an unknown key.
    #[error("checker_config contains unsupported key: {name}")]
    UnknownCheckerConfig {
        /// Offending key.
        name: String,
    },
    /// A checker config threshold is out of range.
    #[error("checker_config.{checker}.{key} must be {requirement}")]
    InvalidThreshold {
        /// Checker name.
        checker: &'static str,
        /// Config key.
        key: &'static str,
        /// Requirement description.
        requirement: &'static str,
    },
}

impl Proposal {
    /// Validates the proposal against the schema contract.
    ///
    /// # Errors
    ///
    /// Returns [`ProposalError`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ProposalError> {
        if self.schema_version != PROPOSAL_SCHEMA_VERSION {
            return Err(ProposalError::SchemaVersion {
                expected: PROPOSAL_SCHEMA_VERSION,
                actual: self.schema_version.clone(),
            });
        }
        require_non_empty(&self.proposal_id, "proposal_id")?;
        require_non_empty(&self.timestamp_utc, "timestamp_utc")?;
        require_non_empty(&self.change_summary, "change_summary")?;
        if !SUPPORTED_BACKENDS.contains(&self.backend.as_str()) {
            return Err(ProposalError::UnsupportedBackend {
                backend: self.backend.clone(),
            });
        }
        require_non_empty(&self.model_script, "model_script")?;
        if !SUPPORTED_SCRIPT_SUFFIXES.iter().any(|s| self.model_script.ends_with(s)) {
            return Err(ProposalError::UnsupportedScript {
                script: self.model_script.clone(),
            });
        }
        if self.requested_actions.is_empty() {
            return Err(ProposalError::NoActions);
        }
        if let Some(change_set) = &self.change_set_path {
            require_non_empty(change_set, "change_set_path")?;
        }

        let known = available_checkers();
        if let Some(checkers) = &self.checkers {
            for name in checkers {
                if !known.contains(&name.as_str()) {
                    return Err(ProposalError::UnknownChecker {
                        name: name.clone(),
                    });
                }
            }
        }
        self.validate_checker_config(&known)?;
        Ok(())
    }

    /// Returns true when any requested action requires backend execution.
    #[must_use]
    pub fn requests_execution(&self) -> bool {
        self.requested_actions.iter().any(|a| a.is_execution())
    }

    /// Returns true when the proposal requests a regression comparison.
    #[must_use]
    pub fn requests_regress(&self) -> bool {
        self.requested_actions.contains(&ProposalAction::Regress)
    }

    /// Checker config keys must name known checkers or `_runtime`, and known
    /// thresholds must be positive.
    fn validate_checker_config(&self, known: &[&'static str]) -> Result<(), ProposalError> {
        for (key, value) in &self.checker_config {
            if key == "_runtime" {
                continue;
            }
            if !known.contains(&key.as_str()) {
                return Err(ProposalError::UnknownCheckerConfig {
                    name: key.clone(),
                });
            }
            let Some(cfg) = value.as_object() else {
                return Err(ProposalError::UnknownCheckerConfig {
                    name: key.clone(),
                });
            };
            match key.as_str() {
                "performance_regression" => {
                    require_positive(cfg, "max_ratio", "performance_regression")?;
                }
                "event_explosion" => {
                    require_positive(cfg, "max_ratio", "event_explosion")?;
                }
                "steady_state_regression" => {
                    require_positive(cfg, "max_abs_delta", "steady_state_regression")?;
                }
                "control_behavior_regression" => {
                    require_positive(cfg, "max_overshoot_abs_delta", "control_behavior_regression")?;
                    require_positive(cfg, "max_settling_time_ratio", "control_behavior_regression")?;
                    require_positive(cfg, "max_steady_state_abs_delta", "control_behavior_regression")?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn require_non_empty(value: &str, field: &'static str) -> Result<(), ProposalError> {
    if value.trim().is_empty() {
        return Err(ProposalError::EmptyField {
            field,
        });
    }
    Ok(())
}

fn require_positive(
    cfg: &Map<String, Value>,
    key: &'static str,
    checker: &'static str,
) -> Result<(), ProposalError> {
    if let Some(value) = cfg.get(key) {
        let ok = value.as_f64().is_some_and(|v| v > 0.0);
        if !ok {
            return Err(ProposalError::InvalidThreshold {
                checker,
                key,
                requirement: "> 0",
            });
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> Proposal {
        Proposal {
            schema_version: PROPOSAL_SCHEMA_VERSION.to_string(),
            proposal_id: "prop-1".to_string(),
            timestamp_utc: "2026-01-01T00:00:00Z".to_string(),
            author_type: AuthorType::Agent,
            backend: "mock".to_string(),
            model_script: "demos/minimal_probe.mos".to_string(),
            change_summary: "demo change".to_string(),
            requested_actions: vec![
                ProposalAction::Check,
                ProposalAction::Simulate,
                ProposalAction::Regress,
            ],
            risk_level: RiskLevel::Low,
            checkers: None,
            checker_config: Map::new(),
            change_set_path: None,
            physical_invariants: Vec::new(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn valid_proposal_passes() {
        sample().validate().expect("proposal must validate");
    }

    #[test]
    fn unknown_checker_is_rejected() {
        let mut proposal = sample();
        proposal.checkers = Some(vec!["not_a_checker".to_string()]);
        assert!(matches!(proposal.validate(), Err(ProposalError::UnknownChecker { .. })));
    }

    #[test]
    fn checker_config_keys_are_restricted() {
        let mut proposal = sample();
        proposal
            .checker_config
            .insert("mystery".to_string(), json!({"max_ratio": 2.0}));
        assert!(matches!(proposal.validate(), Err(ProposalError::UnknownCheckerConfig { .. })));
    }

    #[test]
    fn runtime_key_is_allowed_in_checker_config() {
        let mut proposal = sample();
        proposal
            .checker_config
            .insert("_runtime".to_string(), json!({"disable": ["timeout"]}));
        proposal.validate().expect("_runtime key is allowed");
    }

    #[test]
    fn nonpositive_ratio_is_rejected() {
        let mut proposal = sample();
        proposal
            .checker_config
            .insert("performance_regression".to_string(), json!({"max_ratio": 0.0}));
        assert!(matches!(proposal.validate(), Err(ProposalError::InvalidThreshold { .. })));
    }

    #[test]
    fn bad_script_suffix_is_rejected() {
        let mut proposal = sample();
        proposal.model_script = "demos/minimal_probe.txt".to_string();
        assert!(matches!(proposal.validate(), Err(ProposalError::UnsupportedScript { .. })));
    }
}
