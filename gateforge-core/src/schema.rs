// gateforge-core/src/schema.rs
// ============================================================================
// Module: GateForge Schema Validation
// Description: JSON Schema validation for on-disk artifacts.
// Purpose: Reject malformed artifacts before they enter the pipeline.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! The declared schemas under `schemas/` are embedded at build time and
//! compiled lazily. Validation reports the first violation with its JSON
//! pointer; callers surface the failure as an input error (exit 1).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use jsonschema::JSONSchema;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Artifact Kinds
// ============================================================================

/// Artifact kinds with declared schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Backend evidence (`schemas/evidence.schema.json`).
    Evidence,
    /// Proposal (`schemas/proposal.schema.json`).
    Proposal,
    /// Planner intent (`schemas/intent.schema.json`).
    Intent,
    /// Demo bundle summary (`schemas/demo_bundle_summary.schema.json`).
    DemoBundleSummary,
}

impl ArtifactKind {
    /// Returns the embedded schema source.
    const fn schema_source(self) -> &'static str {
        match self {
            Self::Evidence => include_str!("../../schemas/evidence.schema.json"),
            Self::Proposal => include_str!("../../schemas/proposal.schema.json"),
            Self::Intent => include_str!("../../schemas/intent.schema.json"),
            Self::DemoBundleSummary => {
                include_str!("../../schemas/demo_bundle_summary.schema.json")
            }
        }
    }

    /// Returns the stable schema label used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Evidence => "evidence",
            Self::Proposal => "proposal",
            Self::Intent => "intent",
            Self::DemoBundleSummary => "demo_bundle_summary",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised during schema validation.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The artifact violated its declared schema.
    #[error("{kind} artifact violates schema at {pointer}: {message}")]
    Violation {
        /// Artifact kind label.
        kind: &'static str,
        /// JSON pointer to the offending location.
        pointer: String,
        /// Violation description.
        message: String,
    },
}

// ============================================================================
// SECTION: Validation
// ============================================================================

fn compiled(kind: ArtifactKind) -> &'static JSONSchema {
    fn compile(source: &str) -> JSONSchema {
        let schema: Value =
            serde_json::from_str(source).unwrap_or_else(|_| Value::Object(Default::default()));
        JSONSchema::compile(&schema).unwrap_or_else(|_| {
            JSONSchema::compile(&Value::Object(Default::default()))
                .expect("empty schema always compiles")
        })
    }

    static EVIDENCE: OnceLock<JSONSchema> = OnceLock::new();
    static PROPOSAL: OnceLock<JSONSchema> = OnceLock::new();
    static INTENT: OnceLock<JSONSchema> = OnceLock::new();
    static DEMO: OnceLock<JSONSchema> = OnceLock::new();

    let cell = match kind {
        ArtifactKind::Evidence => &EVIDENCE,
        ArtifactKind::Proposal => &PROPOSAL,
        ArtifactKind::Intent => &INTENT,
        ArtifactKind::DemoBundleSummary => &DEMO,
    };
    cell.get_or_init(|| compile(kind.schema_source()))
}

/// Validates an artifact value against its declared schema.
///
/// # Errors
///
/// Returns [`SchemaError::Violation`] for the first violation found.
pub fn validate_artifact(kind: ArtifactKind, value: &Value) -> Result<(), SchemaError> {
    let schema = compiled(kind);
    if let Err(mut errors) = schema.validate(value) {
        if let Some(first) = errors.next() {
            return Err(SchemaError::Violation {
                kind: kind.label(),
                pointer: first.instance_path.to_string(),
                message: first.to_string(),
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

    #[test]
    fn valid_proposal_passes_schema() {
        let proposal = json!({
            "schema_version": "0.1.0",
            "proposal_id": "prop-1",
            "timestamp_utc": "2026-01-01T00:00:00Z",
            "author_type": "agent",
            "backend": "mock",
            "model_script": "demos/minimal_probe.mos",
            "change_summary": "demo",
            "requested_actions": ["check", "simulate", "regress"],
            "risk_level": "low",
        });
        validate_artifact(ArtifactKind::Proposal, &proposal).expect("valid proposal");
    }

    #[test]
    fn proposal_missing_risk_level_is_rejected() {
        let proposal = json!({
            "schema_version": "0.1.0",
            "proposal_id": "prop-1",
            "timestamp_utc": "2026-01-01T00:00:00Z",
            "author_type": "agent",
            "backend": "mock",
            "model_script": "demos/minimal_probe.mos",
            "change_summary": "demo",
            "requested_actions": ["check"],
        });
        assert!(validate_artifact(ArtifactKind::Proposal, &proposal).is_err());
    }

    #[test]
    fn intent_with_unknown_top_level_key_is_rejected() {
        let intent = json!({
            "intent": "demo_mock_pass",
            "surprise": true,
        });
        assert!(validate_artifact(ArtifactKind::Intent, &intent).is_err());
    }
}
