// gateforge-config/src/promotion.rs
// ============================================================================
// Module: GateForge Promotion Profiles
// Description: Promotion profile and override loading.
// Purpose: Gate governance snapshot promotion with declarative profiles.
// Dependencies: gateforge-core, chrono, serde, thiserror
// ============================================================================

//! ## Overview
//! A promotion profile declares the statuses a snapshot may carry, KPI floors
//! it must clear, and risks that block promotion outright. A human override
//! file can temporarily allow promotion; overrides carry an expiry and are
//! ignored once expired.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::policy::ConfigError;
use gateforge_core::io::read_json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Directory holding promotion profiles.
pub const PROMOTION_PROFILE_DIR: &str = "policies/promotion";

/// Default promotion profile name.
pub const DEFAULT_PROMOTION_PROFILE: &str = "default";

// ============================================================================
// SECTION: Profile Model
// ============================================================================

/// Declarative promotion profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PromotionProfile {
    /// Snapshot statuses eligible for promotion.
    #[serde(default)]
    pub require_status: Vec<String>,
    /// KPI floors the snapshot must clear (higher is better).
    #[serde(default)]
    pub require_kpi_floors: Map<String, Value>,
    /// Risks that block promotion outright.
    #[serde(default)]
    pub require_no_risks: Vec<String>,
    /// Allow promotion when the snapshot is NEEDS_REVIEW.
    #[serde(default)]
    pub allow_promote_even_if_needs_review: bool,
}

/// Human promotion override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PromotionOverride {
    /// Whether the override allows promotion.
    #[serde(default)]
    pub allow_promote: bool,
    /// Override rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Approver identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// UTC expiry timestamp (ISO-8601); expired overrides are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_utc: Option<String>,
}

impl PromotionOverride {
    /// Returns true when the override is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .is_some_and(|expiry| now > expiry.with_timezone(&Utc))
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves a promotion profile name or path to a file path.
///
/// # Errors
///
/// Returns [`ConfigError`] when the selection is ambiguous or missing.
pub fn resolve_promotion_profile_path(
    profile: Option<&str>,
    profile_path: Option<&Path>,
    root: &Path,
) -> Result<PathBuf, ConfigError> {
    if profile.is_some() && profile_path.is_some() {
        return Err(ConfigError::AmbiguousSelection);
    }
    if let Some(path) = profile_path {
        return Ok(path.to_path_buf());
    }
    let name = profile.unwrap_or(DEFAULT_PROMOTION_PROFILE);
    let file_name =
        if name.ends_with(".json") { name.to_string() } else { format!("{name}.json") };
    let path = root.join(PROMOTION_PROFILE_DIR).join(file_name);
    if !path.exists() {
        return Err(ConfigError::ProfileNotFound {
            path,
        });
    }
    Ok(path)
}

/// Loads a promotion profile, surfacing the resolved path.
///
/// # Errors
///
/// Returns [`ConfigError`] on resolution or load failure.
pub fn load_promotion_profile(
    profile: Option<&str>,
    profile_path: Option<&Path>,
    root: &Path,
) -> Result<(PromotionProfile, PathBuf), ConfigError> {
    let path = resolve_promotion_profile_path(profile, profile_path, root)?;
    let parsed: PromotionProfile = read_json(&path).map_err(|source| ConfigError::Load {
        path: path.clone(),
        source,
    })?;
    Ok((parsed, path))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn override_without_expiry_never_expires() {
        let o = PromotionOverride {
            allow_promote: true,
            ..PromotionOverride::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(!o.is_expired(now));
    }

    #[test]
    fn expired_override_is_detected() {
        let o = PromotionOverride {
            allow_promote: true,
            expires_utc: Some("2025-12-31T00:00:00Z".to_string()),
            ..PromotionOverride::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(o.is_expired(now));
        let earlier = Utc.with_ymd_and_hms(2025, 12, 30, 0, 0, 0).unwrap();
        assert!(!o.is_expired(earlier));
    }
}
