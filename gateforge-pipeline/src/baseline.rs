// gateforge-pipeline/src/baseline.rs
// ============================================================================
// Module: GateForge Baseline Resolver
// Description: Map (backend, model_script) to a baseline evidence path.
// Purpose: Resolve `auto` baselines through baselines/index.json.
// Dependencies: gateforge-core, serde
// ============================================================================

//! ## Overview
//! Baseline resolution is a pure function of the index file and the target
//! pair. An explicit path passes through untouched; `auto` consults the
//! index and a miss is the `baseline_not_found` input error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use gateforge_core::io::read_json;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PipelineError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default baseline index path.
pub const DEFAULT_BASELINE_INDEX: &str = "baselines/index.json";

/// Sentinel baseline argument requesting index resolution.
pub const AUTO_BASELINE: &str = "auto";

// ============================================================================
// SECTION: Index Model
// ============================================================================

/// One baseline mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineEntry {
    /// Backend the baseline belongs to.
    pub backend: String,
    /// Model script the baseline belongs to.
    pub model_script: String,
    /// Baseline evidence path.
    pub baseline: String,
}

/// Baseline index artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BaselineIndex {
    /// Ordered mapping entries.
    #[serde(default)]
    pub entries: Vec<BaselineEntry>,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the baseline evidence path for a target pair.
///
/// # Errors
///
/// Returns [`PipelineError::BaselineNotFound`] when `auto` resolution finds
/// no matching entry, and [`PipelineError::Artifact`] when the index cannot
/// be read.
pub fn resolve_baseline_path(
    baseline_arg: &str,
    index_path: &Path,
    backend: &str,
    model_script: &str,
) -> Result<PathBuf, PipelineError> {
    if baseline_arg != AUTO_BASELINE {
        return Ok(PathBuf::from(baseline_arg));
    }
    let index: BaselineIndex = read_json(index_path)?;
    index
        .entries
        .iter()
        .find(|entry| entry.backend == backend && entry.model_script == model_script)
        .filter(|entry| !entry.baseline.is_empty())
        .map(|entry| PathBuf::from(&entry.baseline))
        .ok_or_else(|| PipelineError::BaselineNotFound {
            backend: backend.to_string(),
            model_script: model_script.to_string(),
            index: index_path.to_path_buf(),
        })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use gateforge_core::io::write_json_atomic;
    use tempfile::TempDir;

    use super::*;

    fn index_fixture(dir: &TempDir) -> PathBuf {
        let index = BaselineIndex {
            entries: vec![BaselineEntry {
                backend: "mock".to_string(),
                model_script: "demos/a.mos".to_string(),
                baseline: "baselines/a.json".to_string(),
            }],
        };
        let path = dir.path().join("index.json");
        write_json_atomic(&path, &index).expect("write index");
        path
    }

    #[test]
    fn explicit_path_passes_through() {
        let dir = TempDir::new().expect("tempdir");
        let index = index_fixture(&dir);
        let resolved =
            resolve_baseline_path("baselines/custom.json", &index, "mock", "demos/a.mos")
                .expect("resolve");
        assert_eq!(resolved, PathBuf::from("baselines/custom.json"));
    }

    #[test]
    fn auto_resolves_matching_entry() {
        let dir = TempDir::new().expect("tempdir");
        let index = index_fixture(&dir);
        let resolved =
            resolve_baseline_path(AUTO_BASELINE, &index, "mock", "demos/a.mos").expect("resolve");
        assert_eq!(resolved, PathBuf::from("baselines/a.json"));
    }

    #[test]
    fn auto_miss_is_baseline_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let index = index_fixture(&dir);
        let err = resolve_baseline_path(AUTO_BASELINE, &index, "mock", "demos/other.mos")
            .expect_err("must miss");
        assert!(matches!(err, PipelineError::BaselineNotFound { .. }));
    }

    #[test]
    fn resolution_is_pure_over_index_content() {
        let dir = TempDir::new().expect("tempdir");
        let index = index_fixture(&dir);
        let a = resolve_baseline_path(AUTO_BASELINE, &index, "mock", "demos/a.mos").expect("a");
        let b = resolve_baseline_path(AUTO_BASELINE, &index, "mock", "demos/a.mos").expect("b");
        assert_eq!(a, b);
    }
}
