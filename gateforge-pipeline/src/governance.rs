// gateforge-pipeline/src/governance.rs
// ============================================================================
// Module: GateForge Governance Aggregator
// Description: Fuse repair, review, and CI signals into one snapshot.
// Purpose: Produce the governance snapshot that feeds promotion decisions.
// Dependencies: gateforge-core, serde
// ============================================================================

//! ## Overview
//! The snapshot status is the worst of three signals: the CI matrix status,
//! the repair profile-compare status (strict downgrade rate and reason
//! distribution), and the review ledger status (failure and recovery rates).
//! Risks are an order-stable set. When a previous snapshot is supplied the
//! trend block records the status transition, per-KPI numeric deltas, and
//! the new/resolved risk sets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use gateforge_core::Decision;
use gateforge_core::io::read_json;
use gateforge_core::io::write_json_atomic;
use gateforge_core::io::write_text;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::backend::default_md_path;
use crate::error::PipelineError;
use crate::report;

// ============================================================================
// SECTION: Thresholds
// ============================================================================

/// Configurable governance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GovernanceThresholds {
    /// Strict downgrade rate above which the repair signal fails.
    pub max_strict_downgrade_rate: f64,
    /// Review failure rate above which the review signal fails.
    pub max_fail_rate: f64,
    /// Review recovery rate below which the review signal needs review.
    pub min_review_recovery_rate: f64,
    /// Strict non-pass rate at or above which a risk is raised.
    pub max_strict_non_pass_rate: f64,
}

impl Default for GovernanceThresholds {
    fn default() -> Self {
        Self {
            max_strict_downgrade_rate: 0.25,
            max_fail_rate: 0.5,
            min_review_recovery_rate: 0.5,
            max_strict_non_pass_rate: 0.5,
        }
    }
}

// ============================================================================
// SECTION: Snapshot Model
// ============================================================================

/// KPI block carried by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SnapshotKpis {
    /// Strict downgrade rate from the repair profile compare.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_downgrade_rate: Option<f64>,
    /// Review recovery rate from the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_recovery_rate: Option<f64>,
    /// Strict-profile non-pass rate from the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_non_pass_rate: Option<f64>,
    /// Review approval rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_rate: Option<f64>,
    /// Review failure rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_rate: Option<f64>,
    /// Relation between compared repair strategies, when compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_compare_relation: Option<String>,
    /// Profile the compare block recommends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_profile: Option<String>,
}

/// Trend block computed against a previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTrend {
    /// `<previous> -> <current>` status transition label.
    pub status_transition: String,
    /// Numeric KPI deltas (current minus previous).
    pub kpi_delta: BTreeMap<String, f64>,
    /// Risks present now but not previously.
    pub new_risks: Vec<String>,
    /// Risks present previously but resolved now.
    pub resolved_risks: Vec<String>,
}

/// Governance snapshot artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceSnapshot {
    /// Fused status.
    pub status: Decision,
    /// KPI block.
    pub kpis: SnapshotKpis,
    /// Order-stable risk set.
    pub risks: Vec<String>,
    /// Source artifact paths.
    pub sources: BTreeMap<String, String>,
    /// Trend vs the previous snapshot, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<SnapshotTrend>,
}

/// Input artifact paths for snapshot aggregation.
#[derive(Debug, Clone, Default)]
pub struct SnapshotInputs {
    /// Repair batch (or orchestrate-compare) summary path.
    pub repair_batch_summary: Option<std::path::PathBuf>,
    /// Review ledger summary path.
    pub review_ledger_summary: Option<std::path::PathBuf>,
    /// CI matrix summary path.
    pub ci_matrix_summary: Option<std::path::PathBuf>,
    /// Invariant-repair compare summary path.
    pub invariant_repair_summary: Option<std::path::PathBuf>,
    /// Previous snapshot path for trend derivation.
    pub previous_summary: Option<std::path::PathBuf>,
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

/// Builds the governance snapshot from its input summaries.
///
/// Missing inputs contribute no signal: a snapshot built from nothing is
/// PASS with no risks.
///
/// # Errors
///
/// Returns [`PipelineError`] when a named input exists but cannot be read,
/// or the snapshot cannot be written.
pub fn build_snapshot(
    inputs: &SnapshotInputs,
    thresholds: &GovernanceThresholds,
    out_path: &Path,
    report_path: Option<&Path>,
) -> Result<GovernanceSnapshot, PipelineError> {
    let repair = load_optional(inputs.repair_batch_summary.as_deref())?;
    let review = load_optional(inputs.review_ledger_summary.as_deref())?;
    let matrix = load_optional(inputs.ci_matrix_summary.as_deref())?;
    let invariant = load_optional(inputs.invariant_repair_summary.as_deref())?;
    let previous: Option<GovernanceSnapshot> = match inputs.previous_summary.as_deref() {
        Some(path) if path.exists() => Some(read_json(path)?),
        _ => None,
    };

    let mut status = Decision::Pass;
    let mut risks: Vec<String> = Vec::new();
    let push_risk = |risks: &mut Vec<String>, risk: &str| {
        if !risks.iter().any(|r| r == risk) {
            risks.push(risk.to_string());
        }
    };

    // CI matrix signal: any failed selected job fails the snapshot.
    if let Some(matrix) = &matrix {
        let matrix_failed = matrix
            .get("matrix_status")
            .and_then(Value::as_str)
            .map(|s| s == "FAIL")
            .unwrap_or_else(|| {
                matrix
                    .get("jobs")
                    .and_then(Value::as_array)
                    .is_some_and(|jobs| {
                        jobs.iter().any(|j| {
                            j.get("status").and_then(Value::as_str) == Some("FAIL")
                        })
                    })
            });
        if matrix_failed {
            status = status.worst(Decision::Fail);
            push_risk(&mut risks, "ci_matrix_failed");
        }
    }

    // Repair compare signal.
    let compare = repair.as_ref().and_then(|r| r.get("profile_compare"));
    let strict_downgrade_rate =
        compare.and_then(|c| c.get("strict_downgrade_rate")).and_then(Value::as_f64);
    if let Some(rate) = strict_downgrade_rate {
        if rate > thresholds.max_strict_downgrade_rate {
            status = status.worst(Decision::Fail);
            push_risk(&mut risks, "strict_profile_downgrade_detected");
        } else if rate > 0.0 {
            status = status.worst(Decision::NeedsReview);
            push_risk(&mut risks, "strict_profile_downgrade_detected");
        }
    }
    let reason_regressed = compare
        .and_then(|c| c.pointer("/reason_distribution/new_reasons_in_to"))
        .and_then(Value::as_array)
        .is_some_and(|new| !new.is_empty());
    if reason_regressed {
        status = status.worst(Decision::NeedsReview);
        push_risk(&mut risks, "failure_reason_distribution_regressed");
    }

    // Review ledger signal.
    let review_kpis = review.as_ref().and_then(|r| r.get("kpis"));
    let fail_rate = review_kpis.and_then(|k| k.get("fail_rate")).and_then(Value::as_f64);
    let review_recovery_rate =
        review_kpis.and_then(|k| k.get("review_recovery_rate")).and_then(Value::as_f64);
    let strict_non_pass_rate =
        review_kpis.and_then(|k| k.get("strict_non_pass_rate")).and_then(Value::as_f64);
    let approval_rate = review_kpis.and_then(|k| k.get("approval_rate")).and_then(Value::as_f64);
    if let Some(rate) = fail_rate {
        if rate > thresholds.max_fail_rate {
            status = status.worst(Decision::Fail);
            push_risk(&mut risks, "review_fail_rate_high");
        }
    }
    if let Some(rate) = review_recovery_rate {
        if rate < thresholds.min_review_recovery_rate {
            status = status.worst(Decision::NeedsReview);
            push_risk(&mut risks, "review_recovery_rate_low");
        }
    }
    if let Some(rate) = strict_non_pass_rate {
        if rate >= thresholds.max_strict_non_pass_rate {
            status = status.worst(Decision::NeedsReview);
            push_risk(&mut risks, "strict_non_pass_rate_high");
        }
    }

    // Invariant-repair compare signal is advisory: a failing best profile
    // surfaces as a risk, not a status downgrade.
    if let Some(invariant) = &invariant {
        if invariant.get("status").and_then(Value::as_str) == Some("FAIL") {
            push_risk(&mut risks, "invariant_repair_compare_failed");
        }
    }

    let strategy_compare_relation = repair
        .as_ref()
        .and_then(|r| r.pointer("/strategy_compare/relation"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let recommended_profile = compare
        .and_then(|c| c.get("recommended_profile"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let kpis = SnapshotKpis {
        strict_downgrade_rate,
        review_recovery_rate,
        strict_non_pass_rate,
        approval_rate,
        fail_rate,
        strategy_compare_relation,
        recommended_profile,
    };

    let mut sources = BTreeMap::new();
    for (key, value) in [
        ("repair_batch_summary_path", &inputs.repair_batch_summary),
        ("review_ledger_summary_path", &inputs.review_ledger_summary),
        ("ci_matrix_summary_path", &inputs.ci_matrix_summary),
        ("invariant_repair_summary_path", &inputs.invariant_repair_summary),
    ] {
        if let Some(path) = value {
            sources.insert(key.to_string(), path.display().to_string());
        }
    }

    let trend = previous.as_ref().map(|prev| derive_trend(prev, status, &kpis, &risks));

    let snapshot = GovernanceSnapshot {
        status,
        kpis,
        risks,
        sources,
        trend,
    };
    write_json_atomic(out_path, &snapshot)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::snapshot_markdown(&snapshot))?;
    Ok(snapshot)
}

fn load_optional(path: Option<&Path>) -> Result<Option<Value>, PipelineError> {
    match path {
        Some(path) if path.exists() => Ok(Some(read_json(path)?)),
        Some(_) | None => Ok(None),
    }
}

// ============================================================================
// SECTION: Trend
// ============================================================================

fn derive_trend(
    previous: &GovernanceSnapshot,
    status: Decision,
    kpis: &SnapshotKpis,
    risks: &[String],
) -> SnapshotTrend {
    let mut kpi_delta = BTreeMap::new();
    for (name, prev, curr) in [
        ("strict_downgrade_rate", previous.kpis.strict_downgrade_rate, kpis.strict_downgrade_rate),
        ("review_recovery_rate", previous.kpis.review_recovery_rate, kpis.review_recovery_rate),
        ("strict_non_pass_rate", previous.kpis.strict_non_pass_rate, kpis.strict_non_pass_rate),
        ("approval_rate", previous.kpis.approval_rate, kpis.approval_rate),
        ("fail_rate", previous.kpis.fail_rate, kpis.fail_rate),
    ] {
        if let (Some(prev), Some(curr)) = (prev, curr) {
            kpi_delta.insert(name.to_string(), curr - prev);
        }
    }
    SnapshotTrend {
        status_transition: format!("{} -> {}", previous.status, status),
        kpi_delta,
        new_risks: risks.iter().filter(|r| !previous.risks.contains(r)).cloned().collect(),
        resolved_risks: previous.risks.iter().filter(|r| !risks.contains(r)).cloned().collect(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, name: &str, value: &Value) -> std::path::PathBuf {
        let path = dir.path().join(name);
        write_json_atomic(&path, value).expect("write input");
        path
    }

    #[test]
    fn empty_inputs_produce_clean_pass() {
        let dir = TempDir::new().expect("tempdir");
        let snapshot = build_snapshot(
            &SnapshotInputs::default(),
            &GovernanceThresholds::default(),
            &dir.path().join("snapshot.json"),
            None,
        )
        .expect("snapshot");
        assert_eq!(snapshot.status, Decision::Pass);
        assert!(snapshot.risks.is_empty());
    }

    #[test]
    fn failed_ci_matrix_fails_the_snapshot() {
        let dir = TempDir::new().expect("tempdir");
        let matrix = write(&dir, "matrix.json", &json!({"matrix_status": "FAIL"}));
        let snapshot = build_snapshot(
            &SnapshotInputs {
                ci_matrix_summary: Some(matrix),
                ..SnapshotInputs::default()
            },
            &GovernanceThresholds::default(),
            &dir.path().join("snapshot.json"),
            None,
        )
        .expect("snapshot");
        assert_eq!(snapshot.status, Decision::Fail);
        assert_eq!(snapshot.risks, vec!["ci_matrix_failed"]);
    }

    #[test]
    fn strict_downgrade_rate_over_threshold_fails() {
        let dir = TempDir::new().expect("tempdir");
        let repair = write(
            &dir,
            "repair.json",
            &json!({
                "profile_compare": {
                    "strict_downgrade_rate": 0.4,
                    "recommended_profile": "default_policy",
                    "reason_distribution": {"new_reasons_in_to": []},
                },
            }),
        );
        let snapshot = build_snapshot(
            &SnapshotInputs {
                repair_batch_summary: Some(repair),
                ..SnapshotInputs::default()
            },
            &GovernanceThresholds::default(),
            &dir.path().join("snapshot.json"),
            None,
        )
        .expect("snapshot");
        assert_eq!(snapshot.status, Decision::Fail);
        assert!(snapshot.risks.contains(&"strict_profile_downgrade_detected".to_string()));
        assert_eq!(snapshot.kpis.recommended_profile.as_deref(), Some("default_policy"));
    }

    #[test]
    fn low_recovery_rate_needs_review() {
        let dir = TempDir::new().expect("tempdir");
        let review = write(
            &dir,
            "review.json",
            &json!({"kpis": {"fail_rate": 0.1, "review_recovery_rate": 0.2}}),
        );
        let snapshot = build_snapshot(
            &SnapshotInputs {
                review_ledger_summary: Some(review),
                ..SnapshotInputs::default()
            },
            &GovernanceThresholds::default(),
            &dir.path().join("snapshot.json"),
            None,
        )
        .expect("snapshot");
        assert_eq!(snapshot.status, Decision::NeedsReview);
        assert_eq!(snapshot.risks, vec!["review_recovery_rate_low"]);
    }

    #[test]
    fn trend_tracks_transition_and_risk_churn() {
        let dir = TempDir::new().expect("tempdir");
        let previous = GovernanceSnapshot {
            status: Decision::Pass,
            kpis: SnapshotKpis {
                fail_rate: Some(0.1),
                ..SnapshotKpis::default()
            },
            risks: vec!["review_recovery_rate_low".to_string()],
            sources: BTreeMap::new(),
            trend: None,
        };
        let prev_path = dir.path().join("previous.json");
        write_json_atomic(&prev_path, &previous).expect("previous");
        let review = write(
            &dir,
            "review.json",
            &json!({"kpis": {"fail_rate": 0.9, "review_recovery_rate": 0.9}}),
        );
        let snapshot = build_snapshot(
            &SnapshotInputs {
                review_ledger_summary: Some(review),
                previous_summary: Some(prev_path),
                ..SnapshotInputs::default()
            },
            &GovernanceThresholds::default(),
            &dir.path().join("snapshot.json"),
            None,
        )
        .expect("snapshot");
        let trend = snapshot.trend.expect("trend");
        assert_eq!(trend.status_transition, "PASS -> FAIL");
        assert_eq!(trend.new_risks, vec!["review_fail_rate_high"]);
        assert_eq!(trend.resolved_risks, vec!["review_recovery_rate_low"]);
        assert!((trend.kpi_delta["fail_rate"] - 0.8).abs() < 1e-9);
    }
}
