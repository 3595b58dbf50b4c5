// gateforge-pipeline/src/planner.rs
// ============================================================================
// Module: GateForge Planner and Guardrails
// Description: Goal-to-intent planning with strict output validation.
// Purpose: Turn a goal into a proposal intent and police its change plan.
// Dependencies: gateforge-core, gateforge-config, reqwest, serde
// ============================================================================

//! ## Overview
//! Planners turn a natural-language goal plus optional context into an
//! Intent: a named proposal template with overrides and an optional change
//! plan. Three backends share one contract: `rule` is deterministic,
//! `gemini` calls the hosted model, `openai` is a placeholder that fails
//! explicitly. Planner output is schema-strict — unknown top-level fields
//! reject the whole intent with a single `planner_output_invalid` violation.
//!
//! Guardrails run after planning and emit `rule_id`-tagged violations:
//! confidence outside the configured band, or change-plan files outside the
//! allowed roots / suffixes / exact-file whitelist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;

use chrono::Utc;
use gateforge_core::Decision;
use gateforge_core::Proposal;
use gateforge_core::RiskLevel;
use gateforge_core::core::proposal::AuthorType;
use gateforge_core::core::proposal::PROPOSAL_SCHEMA_VERSION;
use gateforge_core::core::proposal::ProposalAction;
use gateforge_core::PhysicalInvariant;
use gateforge_config::env::EnvOverrides;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::change::ChangeOp;
use crate::change::ChangeSet;
use crate::change::CHANGE_SET_SCHEMA_VERSION;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Intent templates the planners may select.
pub const SUPPORTED_INTENTS: &[&str] = &[
    "demo_mock_pass",
    "demo_openmodelica_pass",
    "medium_openmodelica_pass",
    "runtime_regress_low_risk",
    "runtime_regress_high_risk",
];

/// Current change-plan schema version.
pub const CHANGE_PLAN_SCHEMA_VERSION: &str = "0.1.0";

// ============================================================================
// SECTION: Change Plan
// ============================================================================

/// One planned edit operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOp {
    /// Operation kind; only `replace_text` is supported.
    pub kind: String,
    /// Target file, relative to the workspace root.
    pub file: String,
    /// Text fragment to replace.
    pub old: String,
    /// Replacement text.
    pub new: String,
}

/// Planner-proposed change plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePlan {
    /// Change-plan schema version.
    pub schema_version: String,
    /// Planner confidence in the plan, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Ordered operations.
    pub operations: Vec<PlanOp>,
}

impl ChangePlan {
    /// Validates the change-plan shape.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::InvalidOutput`] for the first violation.
    pub fn validate(&self) -> Result<(), PlannerError> {
        if self.schema_version != CHANGE_PLAN_SCHEMA_VERSION {
            return Err(PlannerError::InvalidOutput(format!(
                "change_plan schema_version must be {CHANGE_PLAN_SCHEMA_VERSION}"
            )));
        }
        if self.operations.is_empty() {
            return Err(PlannerError::InvalidOutput(
                "change_plan operations must be a non-empty list".to_string(),
            ));
        }
        for (idx, op) in self.operations.iter().enumerate() {
            if op.kind != "replace_text" {
                return Err(PlannerError::InvalidOutput(format!(
                    "unsupported change_plan kind at index {idx}: {}",
                    op.kind
                )));
            }
            if op.file.trim().is_empty() || Path::new(&op.file).is_absolute() {
                return Err(PlannerError::InvalidOutput(format!(
                    "change_plan operation[{idx}].file must be a relative, non-empty path"
                )));
            }
        }
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(PlannerError::InvalidOutput(
                    "change_plan confidence must be within [0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Materializes the plan into an applicable change set.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::InvalidOutput`] when the plan is malformed.
    pub fn materialize(&self) -> Result<ChangeSet, PlannerError> {
        self.validate()?;
        Ok(ChangeSet {
            schema_version: CHANGE_SET_SCHEMA_VERSION.to_string(),
            changes: self
                .operations
                .iter()
                .map(|op| ChangeOp {
                    op: "replace_text".to_string(),
                    file: op.file.clone(),
                    old: op.old.clone(),
                    new: op.new.clone(),
                })
                .collect(),
        })
    }
}

// ============================================================================
// SECTION: Intent
// ============================================================================

/// Restricted override surface a planner may set on a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct IntentOverrides {
    /// Risk-level override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    /// Change-summary override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_summary: Option<String>,
    /// Checker selection override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkers: Option<Vec<String>>,
    /// Checker config override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checker_config: Option<Map<String, Value>>,
    /// Change-set path override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set_path: Option<String>,
    /// Physical invariants override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_invariants: Option<Vec<PhysicalInvariant>>,
}

/// Planner output: the contract between planners and the run pipeline.
///
/// Unknown top-level fields are rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Intent {
    /// Selected intent template.
    pub intent: String,
    /// Explicit proposal id, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    /// Proposal overrides.
    #[serde(default)]
    pub overrides: IntentOverrides,
    /// Optional change plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_plan: Option<ChangePlan>,
    /// Optional pre-materialized change set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set_draft: Option<ChangeSet>,
    /// Planner identity string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<String>,
    /// Inputs the planner consumed.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub planner_inputs: Map<String, Value>,
    /// Context forwarded to the planner.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// Raw model response for audit, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Map<String, Value>>,
}

impl Intent {
    /// Validates the intent beyond its serde shape.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::InvalidOutput`] for the first violation.
    pub fn validate(&self) -> Result<(), PlannerError> {
        if !SUPPORTED_INTENTS.contains(&self.intent.as_str()) {
            return Err(PlannerError::InvalidOutput(format!(
                "intent must be one of {SUPPORTED_INTENTS:?}"
            )));
        }
        if let Some(id) = &self.proposal_id {
            if id.trim().is_empty() {
                return Err(PlannerError::InvalidOutput(
                    "proposal_id must be a non-empty string when provided".to_string(),
                ));
            }
        }
        if let Some(plan) = &self.change_plan {
            plan.validate()?;
        }
        if let Some(draft) = &self.change_set_draft {
            draft.validate().map_err(|err| PlannerError::InvalidOutput(err.to_string()))?;
        }
        Ok(())
    }
}

/// Parses a raw JSON value into a validated intent.
///
/// Any shape violation collapses into one `planner_output_invalid` error so
/// guardrail reporting stays single-valued.
///
/// # Errors
///
/// Returns [`PlannerError::InvalidOutput`].
pub fn parse_intent(value: &Value) -> Result<Intent, PlannerError> {
    let intent: Intent = serde_json::from_value(value.clone())
        .map_err(|err| PlannerError::InvalidOutput(err.to_string()))?;
    intent.validate()?;
    Ok(intent)
}

// ============================================================================
// SECTION: Backends
// ============================================================================

/// Planner backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerBackend {
    /// Deterministic rule-based planner.
    Rule,
    /// Hosted Gemini model.
    Gemini,
    /// Placeholder backend; always unavailable.
    OpenAi,
}

impl fmt::Display for PlannerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Rule => "rule",
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for PlannerBackend {
    type Err = PlannerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "rule" => Ok(Self::Rule),
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(PlannerError::InvalidOutput(format!("unknown planner backend: {other}"))),
        }
    }
}

/// Errors raised by planners and guardrails.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Planner backend cannot serve requests.
    #[error("planner_backend_unavailable: {backend}: {message}")]
    BackendUnavailable {
        /// Backend name.
        backend: &'static str,
        /// Failure description.
        message: String,
    },
    /// Planner output violated the intent schema.
    #[error("planner_output_invalid: {0}")]
    InvalidOutput(String),
    /// Goal input was missing or empty.
    #[error("planner goal must be non-empty")]
    MissingGoal,
}

/// Planner request.
#[derive(Debug, Clone, Default)]
pub struct PlannerRequest {
    /// Natural-language goal.
    pub goal: String,
    /// Optional context object (risk_level / change_summary / checkers...).
    pub context: Map<String, Value>,
    /// Backend preference hint (`auto` / `mock` / `openmodelica_docker`).
    pub prefer_backend: Option<String>,
    /// Explicit proposal id for the planned run.
    pub proposal_id: Option<String>,
}

/// Plans an intent with the selected backend.
///
/// # Errors
///
/// Returns [`PlannerError`] when the backend is unavailable or its output is
/// invalid.
pub fn plan_intent(backend: PlannerBackend, req: &PlannerRequest) -> Result<Intent, PlannerError> {
    if req.goal.trim().is_empty() {
        return Err(PlannerError::MissingGoal);
    }
    match backend {
        PlannerBackend::Rule => Ok(rule_plan(req)),
        PlannerBackend::Gemini => gemini_plan(req),
        PlannerBackend::OpenAi => Err(PlannerError::BackendUnavailable {
            backend: "openai",
            message: "openai planner is not implemented".to_string(),
        }),
    }
}

// ============================================================================
// SECTION: Rule Planner
// ============================================================================

fn rule_plan(req: &PlannerRequest) -> Intent {
    let text = req.goal.to_ascii_lowercase();
    let prefer = req
        .context
        .get("prefer_backend")
        .and_then(Value::as_str)
        .filter(|v| matches!(*v, "auto" | "mock" | "openmodelica_docker"))
        .map(str::to_string)
        .or_else(|| req.prefer_backend.clone())
        .unwrap_or_else(|| "auto".to_string());

    let intent = if text.contains("medium") || text.contains("oscillator") {
        "medium_openmodelica_pass"
    } else if text.contains("high risk") || text.contains("critical") {
        "runtime_regress_high_risk"
    } else if text.contains("runtime") && text.contains("regress") {
        "runtime_regress_low_risk"
    } else if text.contains("openmodelica") || text.contains("docker") {
        "demo_openmodelica_pass"
    } else if prefer == "openmodelica_docker" {
        "demo_openmodelica_pass"
    } else {
        "demo_mock_pass"
    };

    let mut overrides = IntentOverrides {
        change_summary: Some(req.goal.clone()),
        ..IntentOverrides::default()
    };
    if text.contains("high risk") {
        overrides.risk_level = Some(RiskLevel::High);
    } else if text.contains("medium risk") {
        overrides.risk_level = Some(RiskLevel::Medium);
    } else if text.contains("low risk") {
        overrides.risk_level = Some(RiskLevel::Low);
    }
    apply_context_overrides(&mut overrides, &req.context);

    let mut planner_inputs = Map::new();
    planner_inputs.insert("goal".to_string(), Value::String(req.goal.clone()));
    planner_inputs.insert("prefer_backend".to_string(), Value::String(prefer));

    Intent {
        intent: intent.to_string(),
        proposal_id: req.proposal_id.clone(),
        overrides,
        change_plan: None,
        change_set_draft: None,
        planner: Some("rule_v0".to_string()),
        planner_inputs,
        context: req.context.clone(),
        raw_response: None,
    }
}

fn apply_context_overrides(overrides: &mut IntentOverrides, context: &Map<String, Value>) {
    if let Some(risk) = context.get("risk_level") {
        if let Ok(risk) = serde_json::from_value::<RiskLevel>(risk.clone()) {
            overrides.risk_level = Some(risk);
        }
    }
    if let Some(summary) = context.get("change_summary").and_then(Value::as_str) {
        if !summary.trim().is_empty() {
            overrides.change_summary = Some(summary.to_string());
        }
    }
    if let Some(checkers) = context.get("checkers").and_then(Value::as_array) {
        let names: Vec<String> =
            checkers.iter().filter_map(Value::as_str).map(str::to_string).collect();
        if !names.is_empty() {
            overrides.checkers = Some(names);
        }
    }
    if let Some(cfg) = context.get("checker_config").and_then(Value::as_object) {
        overrides.checker_config = Some(cfg.clone());
    }
    if let Some(invariants) = context.get("physical_invariants") {
        if let Ok(parsed) = serde_json::from_value::<Vec<PhysicalInvariant>>(invariants.clone()) {
            if !parsed.is_empty() {
                overrides.physical_invariants = Some(parsed);
            }
        }
    }
}

// ============================================================================
// SECTION: Gemini Planner
// ============================================================================

const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

fn gemini_plan(req: &PlannerRequest) -> Result<Intent, PlannerError> {
    let env = EnvOverrides::capture();
    let api_key = env.google_api_key.ok_or_else(|| PlannerError::BackendUnavailable {
        backend: "gemini",
        message: "GOOGLE_API_KEY is not set".to_string(),
    })?;

    let prompt = format!(
        "You are a planner for a simulation governance gate. Respond with one JSON object \
         with keys intent (one of {SUPPORTED_INTENTS:?}), proposal_id, overrides, change_plan. \
         Goal: {goal}\nContext: {context}",
        goal = req.goal,
        context = Value::Object(req.context.clone()),
    );
    let body = serde_json::json!({
        "contents": [{"parts": [{"text": prompt}]}],
        "generationConfig": {"responseMimeType": "application/json"},
    });

    let client = reqwest::blocking::Client::new();
    let response = client
        .post(format!("{GEMINI_ENDPOINT}?key={api_key}"))
        .json(&body)
        .send()
        .map_err(|err| PlannerError::BackendUnavailable {
            backend: "gemini",
            message: err.to_string(),
        })?;
    if !response.status().is_success() {
        return Err(PlannerError::BackendUnavailable {
            backend: "gemini",
            message: format!("http status {}", response.status()),
        });
    }
    let payload: Value = response.json().map_err(|err| PlannerError::BackendUnavailable {
        backend: "gemini",
        message: err.to_string(),
    })?;
    let text = payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PlannerError::InvalidOutput("gemini response carried no text part".to_string())
        })?;
    let raw: Value = serde_json::from_str(text)
        .map_err(|err| PlannerError::InvalidOutput(format!("gemini returned non-JSON: {err}")))?;
    let mut intent = parse_intent(&raw)?;
    intent.planner = Some("gemini".to_string());
    if intent.proposal_id.is_none() {
        intent.proposal_id = req.proposal_id.clone();
    }
    Ok(intent)
}

// ============================================================================
// SECTION: Guardrails
// ============================================================================

/// Guardrail configuration for planner output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GuardrailConfig {
    /// Minimum accepted change-plan confidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_plan_confidence_min: Option<f64>,
    /// Maximum accepted change-plan confidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_plan_confidence_max: Option<f64>,
    /// Directory roots a change plan may touch.
    #[serde(default)]
    pub allowed_roots: Vec<String>,
    /// File suffixes a change plan may touch.
    #[serde(default)]
    pub allowed_suffixes: Vec<String>,
    /// Exact files a change plan may touch.
    #[serde(default)]
    pub allowed_files: Vec<String>,
}

/// One guardrail violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailViolation {
    /// Stable rule identifier.
    pub rule_id: String,
    /// Human-readable message.
    pub message: String,
}

/// Guardrail evaluation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailOutcome {
    /// PASS when no rule fired.
    pub decision: Decision,
    /// Violations in rule order.
    pub violations: Vec<GuardrailViolation>,
}

/// Evaluates the guardrail rules against a planned intent.
#[must_use]
pub fn evaluate_guardrails(intent: &Intent, config: &GuardrailConfig) -> GuardrailOutcome {
    let mut violations = Vec::new();

    if let Some(plan) = &intent.change_plan {
        let confidence = plan.confidence.unwrap_or(0.0);
        if let Some(min) = config.change_plan_confidence_min {
            if confidence < min {
                violations.push(GuardrailViolation {
                    rule_id: "change_plan_confidence_below_min".to_string(),
                    message: format!("change plan confidence {confidence:.2} is below {min:.2}"),
                });
            }
        }
        if let Some(max) = config.change_plan_confidence_max {
            if confidence > max {
                violations.push(GuardrailViolation {
                    rule_id: "change_plan_confidence_above_max".to_string(),
                    message: format!("change plan confidence {confidence:.2} is above {max:.2}"),
                });
            }
        }
        for op in &plan.operations {
            if !file_allowed(&op.file, config) {
                violations.push(GuardrailViolation {
                    rule_id: format!("change_plan_file_not_allowed:{}", op.file),
                    message: format!("change plan touches a file outside the whitelist: {}", op.file),
                });
            }
        }
    }

    GuardrailOutcome {
        decision: if violations.is_empty() { Decision::Pass } else { Decision::Fail },
        violations,
    }
}

fn file_allowed(file: &str, config: &GuardrailConfig) -> bool {
    if config.allowed_roots.is_empty()
        && config.allowed_suffixes.is_empty()
        && config.allowed_files.is_empty()
    {
        return true;
    }
    if config.allowed_files.iter().any(|f| f == file) {
        return true;
    }
    let root_ok = config
        .allowed_roots
        .iter()
        .any(|root| file == root || file.starts_with(&format!("{root}/")));
    if root_ok {
        let suffix_ok = config.allowed_suffixes.is_empty()
            || config.allowed_suffixes.iter().any(|s| file.ends_with(s.as_str()));
        return suffix_ok;
    }
    false
}

// ============================================================================
// SECTION: Proposal Materialization
// ============================================================================

/// Builds a proposal from an intent template plus its overrides.
///
/// # Errors
///
/// Returns [`PlannerError::InvalidOutput`] for an unknown template.
pub fn build_proposal_from_intent(intent: &Intent) -> Result<Proposal, PlannerError> {
    let (backend, model_script, actions, risk) = match intent.intent.as_str() {
        "demo_mock_pass" => (
            "mock",
            "demos/openmodelica/minimal_probe.mos",
            vec![ProposalAction::Check, ProposalAction::Simulate, ProposalAction::Regress],
            RiskLevel::Low,
        ),
        "demo_openmodelica_pass" => (
            "openmodelica_docker",
            "demos/openmodelica/minimal_probe.mos",
            vec![ProposalAction::Check, ProposalAction::Simulate, ProposalAction::Regress],
            RiskLevel::Low,
        ),
        "medium_openmodelica_pass" => (
            "openmodelica_docker",
            "demos/openmodelica/medium_probe.mos",
            vec![ProposalAction::Check, ProposalAction::Simulate, ProposalAction::Regress],
            RiskLevel::Medium,
        ),
        "runtime_regress_low_risk" => (
            "mock",
            "demos/openmodelica/minimal_probe.mos",
            vec![ProposalAction::Check, ProposalAction::Regress],
            RiskLevel::Low,
        ),
        "runtime_regress_high_risk" => (
            "mock",
            "demos/openmodelica/minimal_probe.mos",
            vec![ProposalAction::Check, ProposalAction::Regress],
            RiskLevel::High,
        ),
        other => {
            return Err(PlannerError::InvalidOutput(format!("unsupported intent: {other}")));
        }
    };

    let now = Utc::now();
    let proposal_id = intent
        .proposal_id
        .clone()
        .unwrap_or_else(|| format!("agent-{}-{}", intent.intent, now.timestamp()));

    let mut metadata = Map::new();
    metadata.insert(
        "planner".to_string(),
        Value::String(intent.planner.clone().unwrap_or_else(|| "rule_v0".to_string())),
    );
    metadata.insert("intent".to_string(), Value::String(intent.intent.clone()));

    let overrides = &intent.overrides;
    Ok(Proposal {
        schema_version: PROPOSAL_SCHEMA_VERSION.to_string(),
        proposal_id,
        timestamp_utc: now.to_rfc3339(),
        author_type: AuthorType::Agent,
        backend: backend.to_string(),
        model_script: model_script.to_string(),
        change_summary: overrides
            .change_summary
            .clone()
            .unwrap_or_else(|| format!("Agent proposal for intent: {}", intent.intent)),
        requested_actions: actions,
        risk_level: overrides.risk_level.unwrap_or(risk),
        checkers: overrides.checkers.clone(),
        checker_config: overrides.checker_config.clone().unwrap_or_default(),
        change_set_path: overrides.change_set_path.clone(),
        physical_invariants: overrides.physical_invariants.clone().unwrap_or_default(),
        metadata,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
