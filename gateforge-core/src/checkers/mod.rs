// gateforge-core/src/checkers/mod.rs
// ============================================================================
// Module: GateForge Checker Suite
// Description: Pluggable regression checkers over evidence pairs.
// Purpose: Provide deterministic, fixed-order checker evaluation.
// Dependencies: crate::core, serde, serde_json
// ============================================================================

//! ## Overview
//! Checkers are pure functions over `(baseline, candidate, config)` that emit
//! findings. The registry is a fixed-order list so reasons and findings stay
//! byte-stable across runs. Checker selection honors the proposal's declared
//! list plus `_runtime.enable` / `_runtime.disable` adjustments; an absent
//! selection activates every built-in.
//!
//! Findings carry a severity: only `error` findings contribute to the
//! regression reason list. A checker that cannot evaluate because a required
//! metric is missing emits a `<name>_metric_missing` finding — informational
//! for ordinary checkers, an error for `invariant_guard` which must fail
//! closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod builtin;

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::evidence::Evidence;

pub use builtin::CHECKER_ORDER;

// ============================================================================
// SECTION: Finding
// ============================================================================

/// Severity of a checker finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Finding contributes a regression reason.
    Error,
    /// Finding is informational only.
    Info,
}

/// One structured checker finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Checker that produced the finding.
    pub checker: String,
    /// Stable reason tag.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// Finding severity.
    pub severity: Severity,
    /// Supporting values, when useful for triage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Map<String, Value>>,
}

impl Finding {
    /// Creates an error finding.
    #[must_use]
    pub fn error(checker: &str, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            checker: checker.to_string(),
            reason: reason.into(),
            message: message.into(),
            severity: Severity::Error,
            evidence: None,
        }
    }

    /// Creates an informational finding.
    #[must_use]
    pub fn info(checker: &str, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            checker: checker.to_string(),
            reason: reason.into(),
            message: message.into(),
            severity: Severity::Info,
            evidence: None,
        }
    }

    /// Attaches supporting evidence values.
    #[must_use]
    pub fn with_evidence(mut self, evidence: Map<String, Value>) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

// ============================================================================
// SECTION: Checker Contract
// ============================================================================

/// Evaluation context handed to each checker.
pub struct CheckerContext<'a> {
    /// Baseline evidence.
    pub baseline: &'a Evidence,
    /// Candidate evidence.
    pub candidate: &'a Evidence,
    /// Effective checker configuration (proposal-provided or overrides).
    pub config: &'a Map<String, Value>,
}

impl CheckerContext<'_> {
    /// Reads a numeric config value for a checker, falling back to `default`.
    #[must_use]
    pub fn config_f64(&self, checker: &str, key: &str, default: f64) -> f64 {
        self.config
            .get(checker)
            .and_then(Value::as_object)
            .and_then(|cfg| cfg.get(key))
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    /// Reads an optional numeric config value for a checker.
    #[must_use]
    pub fn config_f64_opt(&self, checker: &str, key: &str) -> Option<f64> {
        self.config
            .get(checker)
            .and_then(Value::as_object)
            .and_then(|cfg| cfg.get(key))
            .and_then(Value::as_f64)
    }

    /// Reads a raw config value for a checker.
    #[must_use]
    pub fn config_value(&self, checker: &str, key: &str) -> Option<&Value> {
        self.config.get(checker).and_then(Value::as_object).and_then(|cfg| cfg.get(key))
    }
}

/// Regression checker over an evidence pair.
pub trait Checker: Send + Sync {
    /// Stable checker name used for selection and config lookup.
    fn name(&self) -> &'static str;

    /// Evaluates the checker, returning zero or more findings.
    fn check(&self, ctx: &CheckerContext<'_>) -> Vec<Finding>;
}

/// Errors raised during checker resolution.
#[derive(Debug, Error)]
pub enum CheckerError {
    /// A requested checker is not registered.
    #[error("unknown checker: {name}")]
    Unknown {
        /// Offending checker name.
        name: String,
    },
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Returns the built-in checker names in emission order.
#[must_use]
pub fn available_checkers() -> Vec<&'static str> {
    CHECKER_ORDER.to_vec()
}

/// Looks up a built-in checker by name.
#[must_use]
fn lookup(name: &str) -> Option<&'static dyn Checker> {
    builtin::registry().iter().find(|c| c.name() == name).copied()
}

/// Resolves the effective checker list from a declared selection and the
/// `_runtime.enable` / `_runtime.disable` adjustments in the config.
#[must_use]
pub fn resolve_checker_names(
    requested: Option<&[String]>,
    config: &Map<String, Value>,
) -> Vec<String> {
    let mut names: Vec<String> = match requested {
        Some(list) => list.to_vec(),
        None => CHECKER_ORDER.iter().map(|s| (*s).to_string()).collect(),
    };

    if let Some(runtime) = config.get("_runtime").and_then(Value::as_object) {
        if let Some(enable) = runtime.get("enable").and_then(Value::as_array) {
            for item in enable {
                if let Some(name) = item.as_str() {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        if let Some(disable) = runtime.get("disable").and_then(Value::as_array) {
            let disabled: Vec<&str> = disable.iter().filter_map(Value::as_str).collect();
            names.retain(|n| !disabled.contains(&n.as_str()));
        }
    }
    names
}

/// Runs the resolved checker list over an evidence pair.
///
/// Returns the full finding list plus the deduplicated reason list derived
/// from error findings, in emission order.
///
/// # Errors
///
/// Returns [`CheckerError::Unknown`] when a resolved name is not registered.
pub fn run_checkers(
    baseline: &Evidence,
    candidate: &Evidence,
    requested: Option<&[String]>,
    config: &Map<String, Value>,
) -> Result<(Vec<Finding>, Vec<String>), CheckerError> {
    let names = resolve_checker_names(requested, config);
    let ctx = CheckerContext {
        baseline,
        candidate,
        config,
    };

    let mut findings = Vec::new();
    for name in &names {
        let checker = lookup(name).ok_or_else(|| CheckerError::Unknown {
            name: name.clone(),
        })?;
        findings.extend(checker.check(&ctx));
    }

    let mut reasons = Vec::new();
    for finding in &findings {
        if finding.severity == Severity::Error && !reasons.contains(&finding.reason) {
            reasons.push(finding.reason.clone());
        }
    }
    Ok((findings, reasons))
}
