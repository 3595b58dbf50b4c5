// gateforge-config/src/env.rs
// ============================================================================
// Module: GateForge Environment Overrides
// Description: Recognized environment variables and their parsing.
// Purpose: Capture environment-provided defaults in one place.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment variables supply defaults only; explicit flags always win.
//! Unparseable values are ignored rather than failing the command, because
//! the flag surface remains the authoritative input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;

// ============================================================================
// SECTION: Variable Names
// ============================================================================

/// Default policy profile name when the flag is absent.
pub const POLICY_PROFILE_ENV: &str = "POLICY_PROFILE";
/// Override for the default runtime regression threshold.
pub const RUNTIME_THRESHOLD_ENV: &str = "GATEFORGE_RUNTIME_THRESHOLD";
/// Enables strict model-script comparison by default.
pub const STRICT_MODEL_SCRIPT_ENV: &str = "GATEFORGE_STRICT_MODEL_SCRIPT";
/// OpenModelica docker image hint.
pub const OM_IMAGE_ENV: &str = "GATEFORGE_OM_IMAGE";
/// OpenModelica script hint.
pub const OM_SCRIPT_ENV: &str = "GATEFORGE_OM_SCRIPT";
/// OpenAI planner credential.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Gemini planner credential.
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

// ============================================================================
// SECTION: Capture
// ============================================================================

/// Snapshot of recognized environment overrides.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Default policy profile name.
    pub policy_profile: Option<String>,
    /// Default runtime regression threshold.
    pub runtime_threshold: Option<f64>,
    /// Strict model-script comparison default.
    pub strict_model_script: bool,
    /// OpenModelica docker image.
    pub om_image: Option<String>,
    /// OpenModelica script path.
    pub om_script: Option<String>,
    /// Gemini API key.
    pub google_api_key: Option<String>,
    /// OpenAI API key.
    pub openai_api_key: Option<String>,
}

impl EnvOverrides {
    /// Captures the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            policy_profile: non_empty(POLICY_PROFILE_ENV),
            runtime_threshold: non_empty(RUNTIME_THRESHOLD_ENV)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0),
            strict_model_script: non_empty(STRICT_MODEL_SCRIPT_ENV)
                .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            om_image: non_empty(OM_IMAGE_ENV),
            om_script: non_empty(OM_SCRIPT_ENV),
            google_api_key: non_empty(GOOGLE_API_KEY_ENV),
            openai_api_key: non_empty(OPENAI_API_KEY_ENV),
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
