// gateforge-config/src/policy.rs
// ============================================================================
// Module: GateForge Policy Loading
// Description: Resolve and load governance policies by name or path.
// Purpose: Provide fail-closed policy resolution with profile support.
// Dependencies: gateforge-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A policy is selected either by explicit path or by profile name resolved
//! under `policies/<name>.json`. The exact supplied name is used for file
//! resolution: `industrial_strict` and `industrial_strict_v0` are distinct
//! profiles. When neither a path nor a profile is given, the `POLICY_PROFILE`
//! environment variable is consulted before falling back to `default`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use gateforge_core::Policy;
use gateforge_core::io::read_json;
use thiserror::Error;

use crate::env::EnvOverrides;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Directory holding named policy profiles.
pub const POLICY_DIR: &str = "policies";

/// Default policy profile name.
pub const DEFAULT_POLICY_PROFILE: &str = "default_policy";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised during configuration resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Both a path and a profile were supplied.
    #[error("use either an explicit policy path or a profile name, not both")]
    AmbiguousSelection,
    /// A named profile did not resolve to a file.
    #[error("policy profile not found: {path:?}")]
    ProfileNotFound {
        /// Path that was probed.
        path: PathBuf,
    },
    /// The policy file failed to load or parse.
    #[error("failed to load policy {path:?}: {source}")]
    Load {
        /// Offending path.
        path: PathBuf,
        /// Underlying artifact error.
        #[source]
        source: gateforge_core::ArtifactError,
    },
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Caller-facing policy selection.
#[derive(Debug, Clone, Default)]
pub struct PolicySelection {
    /// Explicit policy file path.
    pub path: Option<PathBuf>,
    /// Named profile resolved under `policies/`.
    pub profile: Option<String>,
}

impl PolicySelection {
    /// Builds a selection from optional path and profile flags.
    #[must_use]
    pub fn new(path: Option<PathBuf>, profile: Option<String>) -> Self {
        Self {
            path,
            profile,
        }
    }
}

/// Resolves the effective policy path for a selection.
///
/// # Errors
///
/// Returns [`ConfigError`] when the selection is ambiguous or the profile
/// file does not exist.
pub fn resolve_policy_path(
    selection: &PolicySelection,
    root: &Path,
) -> Result<PathBuf, ConfigError> {
    if selection.path.is_some() && selection.profile.is_some() {
        return Err(ConfigError::AmbiguousSelection);
    }
    if let Some(path) = &selection.path {
        return Ok(path.clone());
    }
    let env = EnvOverrides::capture();
    let name = selection
        .profile
        .clone()
        .or(env.policy_profile)
        .unwrap_or_else(|| DEFAULT_POLICY_PROFILE.to_string());
    let file_name = if name.ends_with(".json") { name } else { format!("{name}.json") };
    let path = root.join(POLICY_DIR).join(file_name);
    if !path.exists() {
        return Err(ConfigError::ProfileNotFound {
            path,
        });
    }
    Ok(path)
}

/// Loads the policy for a selection, surfacing the resolved path.
///
/// # Errors
///
/// Returns [`ConfigError`] on resolution or load failure.
pub fn load_policy(
    selection: &PolicySelection,
    root: &Path,
) -> Result<(Policy, PathBuf), ConfigError> {
    let path = resolve_policy_path(selection, root)?;
    let policy: Policy = read_json(&path).map_err(|source| ConfigError::Load {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(path = %path.display(), version = ?policy.policy_version, "policy loaded");
    Ok((policy, path))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn explicit_path_wins() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("custom.json");
        fs::write(&path, "{}").expect("write");
        let selection = PolicySelection::new(Some(path.clone()), None);
        let resolved = resolve_policy_path(&selection, dir.path()).expect("resolve");
        assert_eq!(resolved, path);
    }

    #[test]
    fn profile_resolves_under_policies_dir() {
        let dir = TempDir::new().expect("tempdir");
        let policies = dir.path().join("policies");
        fs::create_dir_all(&policies).expect("mkdir");
        fs::write(policies.join("industrial_strict.json"), "{}").expect("write");
        let selection = PolicySelection::new(None, Some("industrial_strict".to_string()));
        let resolved = resolve_policy_path(&selection, dir.path()).expect("resolve");
        assert!(resolved.ends_with("policies/industrial_strict.json"));
    }

    #[test]
    fn missing_profile_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let selection = PolicySelection::new(None, Some("absent".to_string()));
        assert!(matches!(
            resolve_policy_path(&selection, dir.path()),
            Err(ConfigError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn path_and_profile_together_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let selection =
            PolicySelection::new(Some(dir.path().join("p.json")), Some("default".to_string()));
        assert!(matches!(
            resolve_policy_path(&selection, dir.path()),
            Err(ConfigError::AmbiguousSelection)
        ));
    }
}
