// gateforge-pipeline/src/change.rs
// ============================================================================
// Module: GateForge Change-Set Apply
// Description: Deterministic file patching with hash and preflight.
// Purpose: Apply validated replace_text operations inside a workspace.
// Dependencies: gateforge-core, serde, thiserror
// ============================================================================

//! ## Overview
//! A change set is an ordered list of `replace_text` operations. Application
//! is all-or-nothing per operation: a missing target or unmatched old text
//! aborts with an error the orchestrator records as `change_apply_failed`.
//! The change-set hash is the canonical hash of the ordered operation tuples,
//! so logically identical change sets hash identically regardless of key
//! order in the source file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use gateforge_core::hash_canonical_json;
use gateforge_core::io::read_json;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current change-set schema version.
pub const CHANGE_SET_SCHEMA_VERSION: &str = "0.1.0";

/// Default cap on operations accepted by preflight.
pub const DEFAULT_MAX_CHANGES: usize = 20;

/// File suffixes a change set may touch.
const ALLOWED_SUFFIXES: &[&str] = &[".mo", ".mos"];

// ============================================================================
// SECTION: Model
// ============================================================================

/// One change operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOp {
    /// Operation kind; only `replace_text` is supported.
    pub op: String,
    /// Target file, relative to the workspace root.
    pub file: String,
    /// Text fragment to replace (first occurrence).
    pub old: String,
    /// Replacement text.
    pub new: String,
}

/// Ordered change-set artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Change-set schema version.
    pub schema_version: String,
    /// Ordered operations.
    pub changes: Vec<ChangeOp>,
}

/// One applied-change record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedChange {
    /// Operation kind.
    pub op: String,
    /// Target file.
    pub file: String,
    /// Preview of the replaced fragment.
    pub replaced_preview: String,
}

/// Result of applying a change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeApplyResult {
    /// Canonical hash over the ordered operation tuples.
    pub change_set_hash: String,
    /// Applied-change records, in operation order.
    pub applied_changes: Vec<AppliedChange>,
}

/// Errors raised by change-set validation and application.
#[derive(Debug, Error)]
pub enum ChangeError {
    /// Schema version is not supported.
    #[error("change_set schema_version must be {CHANGE_SET_SCHEMA_VERSION}, got {actual}")]
    SchemaVersion {
        /// Observed version.
        actual: String,
    },
    /// Change list is empty.
    #[error("change_set changes must be a non-empty list")]
    Empty,
    /// Unsupported operation kind.
    #[error("unsupported change op at index {index}: {op}")]
    UnsupportedOp {
        /// Operation index.
        index: usize,
        /// Offending op kind.
        op: String,
    },
    /// Target path is absolute or escapes the workspace.
    #[error("change[{index}] target escapes workspace: {file}")]
    UnsafeTarget {
        /// Operation index.
        index: usize,
        /// Offending file path.
        file: String,
    },
    /// Target file does not exist.
    #[error("change[{index}] target file not found: {file}")]
    TargetNotFound {
        /// Operation index.
        index: usize,
        /// Offending file path.
        file: String,
    },
    /// Old text fragment was not found in the target.
    #[error("change[{index}] old text not found in {file}")]
    OldTextNotFound {
        /// Operation index.
        index: usize,
        /// Offending file path.
        file: String,
    },
    /// Target file could not be read or written.
    #[error("change[{index}] io failure on {file}: {message}")]
    Io {
        /// Operation index.
        index: usize,
        /// Offending file path.
        file: String,
        /// Failure description.
        message: String,
    },
}

// ============================================================================
// SECTION: Validation
// ============================================================================

impl ChangeSet {
    /// Validates the change-set shape.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeError`] for the first violation found.
    pub fn validate(&self) -> Result<(), ChangeError> {
        if self.schema_version != CHANGE_SET_SCHEMA_VERSION {
            return Err(ChangeError::SchemaVersion {
                actual: self.schema_version.clone(),
            });
        }
        if self.changes.is_empty() {
            return Err(ChangeError::Empty);
        }
        for (index, change) in self.changes.iter().enumerate() {
            if change.op != "replace_text" {
                return Err(ChangeError::UnsupportedOp {
                    index,
                    op: change.op.clone(),
                });
            }
            if change.file.trim().is_empty() || Path::new(&change.file).is_absolute() {
                return Err(ChangeError::UnsafeTarget {
                    index,
                    file: change.file.clone(),
                });
            }
        }
        Ok(())
    }

    /// Canonical hash over the ordered operation tuples.
    #[must_use]
    pub fn hash(&self) -> Option<String> {
        let tuples: Vec<(&str, &str, &str, &str)> = self
            .changes
            .iter()
            .map(|c| (c.op.as_str(), c.file.as_str(), c.old.as_str(), c.new.as_str()))
            .collect();
        hash_canonical_json(&tuples).ok().map(|d| d.value)
    }
}

/// Loads and validates a change set from disk.
///
/// # Errors
///
/// Returns an artifact error on read failure or [`ChangeError`] on shape
/// violations.
pub fn load_change_set(path: &Path) -> Result<ChangeSet, crate::error::PipelineError> {
    let change_set: ChangeSet = read_json(path)?;
    change_set.validate()?;
    Ok(change_set)
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Applies a validated change set inside the workspace root.
///
/// Each operation replaces the first occurrence of `old` in its target.
///
/// # Errors
///
/// Returns [`ChangeError`] for the first operation that cannot be applied.
pub fn apply_change_set(
    change_set: &ChangeSet,
    workspace_root: &Path,
) -> Result<ChangeApplyResult, ChangeError> {
    change_set.validate()?;
    let root = workspace_root.to_path_buf();
    let mut applied = Vec::with_capacity(change_set.changes.len());

    for (index, change) in change_set.changes.iter().enumerate() {
        let target = contained_target(&root, &change.file).ok_or_else(|| {
            ChangeError::UnsafeTarget {
                index,
                file: change.file.clone(),
            }
        })?;
        if !target.exists() {
            return Err(ChangeError::TargetNotFound {
                index,
                file: change.file.clone(),
            });
        }
        let original = fs::read_to_string(&target).map_err(|err| ChangeError::Io {
            index,
            file: change.file.clone(),
            message: err.to_string(),
        })?;
        let Some(pos) = original.find(&change.old) else {
            return Err(ChangeError::OldTextNotFound {
                index,
                file: change.file.clone(),
            });
        };
        let mut replaced = String::with_capacity(original.len());
        replaced.push_str(&original[..pos]);
        replaced.push_str(&change.new);
        replaced.push_str(&original[pos + change.old.len()..]);
        fs::write(&target, replaced).map_err(|err| ChangeError::Io {
            index,
            file: change.file.clone(),
            message: err.to_string(),
        })?;
        applied.push(AppliedChange {
            op: change.op.clone(),
            file: change.file.clone(),
            replaced_preview: change.old.chars().take(60).collect(),
        });
    }

    Ok(ChangeApplyResult {
        change_set_hash: change_set.hash().unwrap_or_default(),
        applied_changes: applied,
    })
}

/// Resolves a relative target path, rejecting escapes from the root.
fn contained_target(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return None;
    }
    for component in rel_path.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return None;
        }
    }
    Some(root.join(rel_path))
}

// ============================================================================
// SECTION: Preflight
// ============================================================================

/// Preflight report for a change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightReport {
    /// Whether the change set passed every check.
    pub ok: bool,
    /// `passed` or `failed`.
    pub status: String,
    /// Deduplicated failure reasons.
    pub reasons: Vec<String>,
    /// Human hints per failure.
    pub hints: Vec<String>,
    /// Target files in operation order.
    pub targets: Vec<String>,
}

/// Scope-checks a change set without mutating anything.
#[must_use]
pub fn preflight_change_set(
    change_set: &ChangeSet,
    workspace_root: &Path,
    allowed_roots: &[String],
    max_changes: usize,
) -> PreflightReport {
    let mut reasons = Vec::new();
    let mut hints = Vec::new();
    let mut targets = Vec::new();

    let push = |reasons: &mut Vec<String>, hints: &mut Vec<String>, r: &str, h: String| {
        if !reasons.iter().any(|x| x == r) {
            reasons.push(r.to_string());
        }
        if !hints.contains(&h) {
            hints.push(h);
        }
    };

    if change_set.changes.len() > max_changes {
        push(
            &mut reasons,
            &mut hints,
            "change_preflight_too_many_changes",
            format!(
                "Change-set has {} changes; limit is {max_changes}.",
                change_set.changes.len()
            ),
        );
    }

    for (idx, change) in change_set.changes.iter().enumerate() {
        let rel = change.file.trim();
        if rel.is_empty() {
            push(
                &mut reasons,
                &mut hints,
                "change_preflight_invalid_target",
                format!("change[{idx}] has empty file path."),
            );
            continue;
        }
        targets.push(rel.to_string());
        let Some(target) = contained_target(workspace_root, rel) else {
            push(
                &mut reasons,
                &mut hints,
                "change_preflight_unsafe_scope",
                format!("change[{idx}] escapes workspace: {rel}"),
            );
            continue;
        };
        let in_allowed_root = allowed_roots
            .iter()
            .any(|prefix| rel == prefix || rel.starts_with(&format!("{prefix}/")));
        if !in_allowed_root {
            push(
                &mut reasons,
                &mut hints,
                "change_preflight_disallowed_path",
                format!("change[{idx}] path is outside allowed roots: {rel}"),
            );
        }
        if !ALLOWED_SUFFIXES.iter().any(|s| rel.ends_with(s)) {
            push(
                &mut reasons,
                &mut hints,
                "change_preflight_disallowed_filetype",
                format!("change[{idx}] file extension is not allowed: {rel}"),
            );
        }
        if !target.exists() {
            push(
                &mut reasons,
                &mut hints,
                "change_preflight_target_not_found",
                format!("change[{idx}] target file not found: {rel}"),
            );
        }
    }

    let ok = reasons.is_empty();
    PreflightReport {
        ok,
        status: if ok { "passed" } else { "failed" }.to_string(),
        reasons,
        hints,
        targets,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn change_set(file: &str, old: &str, new: &str) -> ChangeSet {
        ChangeSet {
            schema_version: CHANGE_SET_SCHEMA_VERSION.to_string(),
            changes: vec![ChangeOp {
                op: "replace_text".to_string(),
                file: file.to_string(),
                old: old.to_string(),
                new: new.to_string(),
            }],
        }
    }

    #[test]
    fn apply_replaces_first_occurrence_only() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("model.mos");
        fs::write(&target, "k=1; k=1;").expect("seed");
        let result =
            apply_change_set(&change_set("model.mos", "k=1", "k=2"), dir.path()).expect("apply");
        assert_eq!(fs::read_to_string(&target).expect("read"), "k=2; k=1;");
        assert_eq!(result.applied_changes.len(), 1);
        assert_eq!(result.change_set_hash.len(), 64);
    }

    #[test]
    fn hash_is_stable_across_key_order() {
        let a = change_set("model.mos", "x", "y");
        let b = change_set("model.mos", "x", "y");
        assert_eq!(a.hash(), b.hash());
        let c = change_set("model.mos", "x", "z");
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn escape_paths_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let err = apply_change_set(&change_set("../outside.mos", "a", "b"), dir.path())
            .expect_err("must reject");
        assert!(matches!(err, ChangeError::UnsafeTarget { .. }));
    }

    #[test]
    fn missing_old_text_aborts() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("model.mos"), "nothing here").expect("seed");
        let err = apply_change_set(&change_set("model.mos", "absent", "x"), dir.path())
            .expect_err("must reject");
        assert!(matches!(err, ChangeError::OldTextNotFound { .. }));
    }

    #[test]
    fn preflight_flags_scope_and_filetype() {
        let dir = TempDir::new().expect("tempdir");
        let cs = ChangeSet {
            schema_version: CHANGE_SET_SCHEMA_VERSION.to_string(),
            changes: vec![
                ChangeOp {
                    op: "replace_text".to_string(),
                    file: "elsewhere/model.mos".to_string(),
                    old: "a".to_string(),
                    new: "b".to_string(),
                },
                ChangeOp {
                    op: "replace_text".to_string(),
                    file: "demos/readme.txt".to_string(),
                    old: "a".to_string(),
                    new: "b".to_string(),
                },
            ],
        };
        let report =
            preflight_change_set(&cs, dir.path(), &["demos".to_string()], DEFAULT_MAX_CHANGES);
        assert!(!report.ok);
        assert!(report.reasons.contains(&"change_preflight_disallowed_path".to_string()));
        assert!(report.reasons.contains(&"change_preflight_disallowed_filetype".to_string()));
        assert!(report.reasons.contains(&"change_preflight_target_not_found".to_string()));
    }
}
