// gateforge-pipeline/src/batch.rs
// ============================================================================
// Module: GateForge Repair Batch
// Description: Run the repair loop over a case pack, with profile compare.
// Purpose: Aggregate repair effectiveness and compare policy profiles.
// Dependencies: gateforge-core, crate::repair, std::thread
// ============================================================================

//! ## Overview
//! A pack names independent repair cases. Cases run over a bounded worker
//! pool (size configurable, default 1); regardless of worker count the
//! summary lists cases in pack declaration order — each case keeps its
//! declaration index and the pool's completion order never leaks into the
//! output. Within a case the retry sequence stays strictly serial.
//!
//! Profile compare runs the full pack twice under two policy profiles and
//! derives status transitions, the strict downgrade rate, and a reason
//! distribution delta; the recommended profile is the one with the higher
//! lexicographic `(pass_count, -fail_count)` tuple.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use gateforge_core::DeltaRelation;
use gateforge_core::RunStatus;
use gateforge_core::io::read_json;
use gateforge_core::io::write_json_atomic;
use gateforge_core::io::write_text;
use gateforge_config::PolicySelection;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::backend::default_md_path;
use crate::error::PipelineError;
use crate::planner::PlannerBackend;
use crate::repair::DEFAULT_MAX_RETRIES;
use crate::repair::DEFAULT_RETRY_CONFIDENCE_MIN;
use crate::repair::RepairRequest;
use crate::repair::run_repair_loop;
use crate::report;

// ============================================================================
// SECTION: Pack Model
// ============================================================================

/// One repair case inside a pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairCase {
    /// Case name; defaults to `case_<index>` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Source summary path.
    pub source: String,
    /// Planner backend override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_backend: Option<String>,
    /// Baseline override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
    /// Retry budget override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Policy profile override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_profile: Option<String>,
    /// Explicit proposal id for the repaired run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    /// Free-form metadata preserved verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Repair batch pack artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairPack {
    /// Pack identifier.
    pub pack_id: String,
    /// Artifact the pack was generated from, when derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_from: Option<String>,
    /// Declared cases.
    pub cases: Vec<RepairCase>,
}

impl RepairPack {
    /// Validates the pack shape.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Input`] for the first violation.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.cases.is_empty() {
            return Err(PipelineError::Input(
                "pack must contain a non-empty 'cases' list".to_string(),
            ));
        }
        for (idx, case) in self.cases.iter().enumerate() {
            if case.source.trim().is_empty() {
                return Err(PipelineError::Input(format!("cases[{idx}].source is required")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Batch Options
// ============================================================================

/// Batch execution options.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker pool size; 1 keeps execution fully serial.
    pub workers: usize,
    /// Default planner backend.
    pub planner_backend: PlannerBackend,
    /// Default baseline argument.
    pub baseline: String,
    /// Baseline index path.
    pub baseline_index: PathBuf,
    /// Runtime regression threshold.
    pub runtime_threshold: f64,
    /// Default policy selection.
    pub policy: PolicySelection,
    /// Default retry budget.
    pub max_retries: u32,
    /// Retry confidence floor.
    pub retry_confidence_min: f64,
    /// Whether to keep running after a failing case.
    pub continue_on_fail: bool,
    /// Safety-guard prefix forwarded to each case.
    pub block_new_reason_prefix: Option<String>,
    /// Profile pair for compare mode.
    pub compare_policy_profiles: Option<(String, String)>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            planner_backend: PlannerBackend::Rule,
            baseline: "auto".to_string(),
            baseline_index: PathBuf::from(crate::baseline::DEFAULT_BASELINE_INDEX),
            runtime_threshold: gateforge_core::regression::DEFAULT_RUNTIME_THRESHOLD,
            policy: PolicySelection::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_confidence_min: DEFAULT_RETRY_CONFIDENCE_MIN,
            continue_on_fail: true,
            block_new_reason_prefix: None,
            compare_policy_profiles: None,
        }
    }
}

// ============================================================================
// SECTION: Result Model
// ============================================================================

/// One per-case result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRow {
    /// Case name.
    pub name: String,
    /// Source summary path.
    pub source: String,
    /// Final case status.
    pub status: RunStatus,
    /// Before/after delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaRelation>,
    /// Whether the safety guard fired.
    pub safety_guard_triggered: bool,
    /// Whether a retry ran.
    pub retry_used: bool,
    /// Planner backend used.
    pub planner_backend: String,
    /// After-state reasons.
    pub reasons: Vec<String>,
    /// Per-case summary artifact path.
    pub json_path: String,
    /// Policy profile the case ran under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_profile: Option<String>,
}

/// Aggregate effectiveness counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BatchCounts {
    /// Number of executed cases.
    pub total_cases: usize,
    /// PASS count.
    pub pass_count: usize,
    /// FAIL count.
    pub fail_count: usize,
    /// NEEDS_REVIEW count.
    pub needs_review_count: usize,
    /// UNKNOWN count.
    pub unknown_count: usize,
    /// Improved-delta count.
    pub improved_count: usize,
    /// Unchanged-delta count.
    pub unchanged_count: usize,
    /// Worse-delta count.
    pub worse_count: usize,
    /// Safety-guard-triggered count.
    pub safety_block_count: usize,
}

/// Reason distribution comparison between two profile runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonDistribution {
    /// Reason counts under the from-profile.
    pub from_counts: BTreeMap<String, u64>,
    /// Reason counts under the to-profile.
    pub to_counts: BTreeMap<String, u64>,
    /// Per-reason delta over the union of reasons.
    pub delta_counts: BTreeMap<String, i64>,
    /// Reasons only present under the to-profile.
    pub new_reasons_in_to: Vec<String>,
    /// Reasons resolved under the to-profile.
    pub resolved_reasons_in_to: Vec<String>,
}

/// One per-case status transition between profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileTransition {
    /// Case name.
    pub name: String,
    /// Status under the from-profile.
    pub from_status: RunStatus,
    /// Status under the to-profile.
    pub to_status: RunStatus,
    /// Transition relation.
    pub relation: String,
}

/// Profile comparison block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCompare {
    /// From-profile name.
    pub from_policy_profile: String,
    /// To-profile name.
    pub to_policy_profile: String,
    /// Cases compared under both profiles.
    pub total_compared_cases: usize,
    /// Downgrade count (to scored lower).
    pub downgrade_count: usize,
    /// Upgrade count.
    pub upgrade_count: usize,
    /// Unchanged count.
    pub unchanged_count: usize,
    /// PASS-under-from but non-PASS-under-to, over compared cases.
    pub strict_downgrade_rate: f64,
    /// Per-case transitions ordered by case name.
    pub transitions: Vec<ProfileTransition>,
    /// Reason distribution delta.
    pub reason_distribution: ReasonDistribution,
    /// Profile with the better `(pass_count, -fail_count)` tuple.
    pub recommended_profile: String,
}

/// Batch summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Pack identifier.
    pub pack_id: String,
    /// Default planner backend.
    pub planner_backend_default: String,
    /// Aggregate counters.
    #[serde(flatten)]
    pub counts: BatchCounts,
    /// Per-case rows in pack declaration order.
    pub cases: Vec<CaseRow>,
    /// Policy profile the primary run used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_profile: Option<String>,
    /// Profile comparison, in compare mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_compare: Option<ProfileCompare>,
}

// ============================================================================
// SECTION: Batch Execution
// ============================================================================

/// Loads and validates a pack artifact.
///
/// # Errors
///
/// Returns [`PipelineError`] on read or shape failure.
pub fn load_pack(path: &Path) -> Result<RepairPack, PipelineError> {
    let pack: RepairPack = read_json(path)?;
    pack.validate()?;
    Ok(pack)
}

/// Runs a pack through the repair loop and writes the batch summary.
///
/// # Errors
///
/// Returns [`PipelineError`] for failures before the summary is written.
pub fn run_repair_batch(
    root: &Path,
    pack: &RepairPack,
    out_dir: &Path,
    summary_out: &Path,
    report_out: Option<&Path>,
    options: &BatchOptions,
) -> Result<BatchSummary, PipelineError> {
    pack.validate()?;

    let (primary_profile, compare_profile) = match &options.compare_policy_profiles {
        Some((from, to)) => (Some(from.clone()), Some(to.clone())),
        None => (options.policy.profile.clone(), None),
    };

    let (primary_rows, primary_counts) =
        run_cases(root, pack, out_dir, options, primary_profile.as_deref(), "primary")?;

    let profile_compare = match (&options.compare_policy_profiles, &compare_profile) {
        (Some((from, to)), Some(_)) => {
            let (compare_rows, _) =
                run_cases(root, pack, out_dir, options, Some(to.as_str()), "compare")?;
            Some(compare_profiles(&primary_rows, &compare_rows, from, to))
        }
        _ => None,
    };

    let summary = BatchSummary {
        pack_id: pack.pack_id.clone(),
        planner_backend_default: options.planner_backend.to_string(),
        counts: primary_counts,
        cases: primary_rows,
        policy_profile: primary_profile,
        profile_compare,
    };

    write_json_atomic(summary_out, &summary)?;
    let report_path =
        report_out.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(summary_out));
    write_text(&report_path, &report::batch_markdown(&summary))?;
    Ok(summary)
}

/// Executes all cases over the bounded worker pool.
///
/// Each case keeps its declaration index; the output vector is assembled by
/// index so pool scheduling cannot reorder it.
fn run_cases(
    root: &Path,
    pack: &RepairPack,
    out_dir: &Path,
    options: &BatchOptions,
    profile_override: Option<&str>,
    tag: &str,
) -> Result<(Vec<CaseRow>, BatchCounts), PipelineError> {
    let workers = options.workers.max(1);
    let total = pack.cases.len();
    let slots: Mutex<Vec<Option<CaseRow>>> = Mutex::new(vec![None; total]);
    let next: Mutex<usize> = Mutex::new(0);
    let stop: Mutex<bool> = Mutex::new(false);

    std::thread::scope(|scope| {
        for _ in 0..workers.min(total) {
            scope.spawn(|| {
                loop {
                    let index = {
                        let mut guard = next.lock().expect("work queue lock");
                        if *guard >= total {
                            break;
                        }
                        if *stop.lock().expect("stop flag lock") {
                            break;
                        }
                        let index = *guard;
                        *guard += 1;
                        index
                    };
                    let case = &pack.cases[index];
                    let row = execute_case(root, case, index, out_dir, options, profile_override, tag);
                    let failing = row.status == RunStatus::Fail || row.status == RunStatus::Unknown;
                    slots.lock().expect("result slot lock")[index] = Some(row);
                    if failing && !options.continue_on_fail {
                        *stop.lock().expect("stop flag lock") = true;
                        break;
                    }
                }
            });
        }
    });

    let rows: Vec<CaseRow> = slots
        .into_inner()
        .map_err(|_| PipelineError::Input("batch worker panicked".to_string()))?
        .into_iter()
        .flatten()
        .collect();

    let mut counts = BatchCounts {
        total_cases: rows.len(),
        ..BatchCounts::default()
    };
    for row in &rows {
        match row.status {
            RunStatus::Pass => counts.pass_count += 1,
            RunStatus::Fail => counts.fail_count += 1,
            RunStatus::NeedsReview => counts.needs_review_count += 1,
            RunStatus::Unknown => counts.unknown_count += 1,
        }
        match row.delta {
            Some(DeltaRelation::Improved) => counts.improved_count += 1,
            Some(DeltaRelation::Worse) => counts.worse_count += 1,
            _ => counts.unchanged_count += 1,
        }
        if row.safety_guard_triggered {
            counts.safety_block_count += 1;
        }
    }
    Ok((rows, counts))
}

fn execute_case(
    root: &Path,
    case: &RepairCase,
    index: usize,
    out_dir: &Path,
    options: &BatchOptions,
    profile_override: Option<&str>,
    tag: &str,
) -> CaseRow {
    let name = case.name.clone().unwrap_or_else(|| format!("case_{}", index + 1));
    let safe_name = safe_case_name(&name);
    let suffix = if tag.is_empty() { String::new() } else { format!("_{tag}") };
    let case_out = out_dir.join(format!("{safe_name}{suffix}.json"));

    let backend = case
        .planner_backend
        .as_deref()
        .and_then(|b| b.parse::<PlannerBackend>().ok())
        .unwrap_or(options.planner_backend);
    let profile = profile_override
        .map(str::to_string)
        .or_else(|| case.policy_profile.clone())
        .or_else(|| options.policy.profile.clone());

    let request = RepairRequest {
        root,
        source_path: Path::new(&case.source),
        goal: None,
        planner_backend: backend,
        strategy_profile: "default".to_string(),
        proposal_id: case.proposal_id.clone(),
        baseline: case.baseline.clone().unwrap_or_else(|| options.baseline.clone()),
        baseline_index: options.baseline_index.clone(),
        runtime_threshold: options.runtime_threshold,
        policy: PolicySelection::new(options.policy.path.clone(), profile.clone()),
        max_retries: case.max_retries.unwrap_or(options.max_retries),
        retry_on_failed_attempt: true,
        retry_confidence_min: options.retry_confidence_min,
        block_new_reason_prefix: options.block_new_reason_prefix.clone(),
        new_critical_reasons: Vec::new(),
        invariant_repair_profile: None,
        out_path: case_out.clone(),
        report_path: None,
    };

    match run_repair_loop(&request) {
        Ok(summary) => CaseRow {
            name,
            source: case.source.clone(),
            status: summary.status,
            delta: Some(summary.comparison.delta),
            safety_guard_triggered: summary.safety_guard_triggered,
            retry_used: summary.retry_used,
            planner_backend: summary.planner_backend,
            reasons: summary.after.reasons,
            json_path: case_out.display().to_string(),
            policy_profile: profile,
        },
        Err(err) => {
            tracing::warn!(case = %name, error = %err, "repair case failed to execute");
            CaseRow {
                name,
                source: case.source.clone(),
                status: RunStatus::Unknown,
                delta: None,
                safety_guard_triggered: false,
                retry_used: false,
                planner_backend: backend.to_string(),
                reasons: vec![format!("case_execution_error:{err}")],
                json_path: case_out.display().to_string(),
                policy_profile: profile,
            }
        }
    }
}

fn safe_case_name(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() { "case".to_string() } else { trimmed.to_string() }
}

// ============================================================================
// SECTION: Profile Compare
// ============================================================================

/// Compares two profile runs of the same pack.
#[must_use]
pub fn compare_profiles(
    from_rows: &[CaseRow],
    to_rows: &[CaseRow],
    from_profile: &str,
    to_profile: &str,
) -> ProfileCompare {
    let from_by_name: BTreeMap<&str, &CaseRow> =
        from_rows.iter().map(|r| (r.name.as_str(), r)).collect();
    let to_by_name: BTreeMap<&str, &CaseRow> =
        to_rows.iter().map(|r| (r.name.as_str(), r)).collect();

    let mut transitions = Vec::new();
    let mut downgrade = 0_usize;
    let mut upgrade = 0_usize;
    let mut unchanged = 0_usize;
    let mut strict_downgrades = 0_usize;

    for (name, from_row) in &from_by_name {
        let Some(to_row) = to_by_name.get(name) else {
            continue;
        };
        let relation = if to_row.status.score() < from_row.status.score() {
            downgrade += 1;
            "downgraded"
        } else if to_row.status.score() > from_row.status.score() {
            upgrade += 1;
            "upgraded"
        } else {
            unchanged += 1;
            "unchanged"
        };
        if from_row.status == RunStatus::Pass && to_row.status != RunStatus::Pass {
            strict_downgrades += 1;
        }
        transitions.push(ProfileTransition {
            name: (*name).to_string(),
            from_status: from_row.status,
            to_status: to_row.status,
            relation: relation.to_string(),
        });
    }

    let total = transitions.len();
    let strict_downgrade_rate = if total == 0 {
        0.0
    } else {
        round4(strict_downgrades as f64 / total as f64)
    };

    let from_counts = reason_counts(from_rows);
    let to_counts = reason_counts(to_rows);
    let mut delta_counts = BTreeMap::new();
    for reason in from_counts.keys().chain(to_counts.keys()) {
        let delta = to_counts.get(reason).copied().unwrap_or(0) as i64
            - from_counts.get(reason).copied().unwrap_or(0) as i64;
        delta_counts.insert(reason.clone(), delta);
    }
    let new_reasons_in_to: Vec<String> =
        to_counts.keys().filter(|k| !from_counts.contains_key(*k)).cloned().collect();
    let resolved_reasons_in_to: Vec<String> =
        from_counts.keys().filter(|k| !to_counts.contains_key(*k)).cloned().collect();

    let from_tuple = profile_tuple(from_rows);
    let to_tuple = profile_tuple(to_rows);
    let recommended_profile =
        if to_tuple > from_tuple { to_profile.to_string() } else { from_profile.to_string() };

    ProfileCompare {
        from_policy_profile: from_profile.to_string(),
        to_policy_profile: to_profile.to_string(),
        total_compared_cases: total,
        downgrade_count: downgrade,
        upgrade_count: upgrade,
        unchanged_count: unchanged,
        strict_downgrade_rate,
        transitions,
        reason_distribution: ReasonDistribution {
            from_counts,
            to_counts,
            delta_counts,
            new_reasons_in_to,
            resolved_reasons_in_to,
        },
        recommended_profile,
    }
}

fn reason_counts(rows: &[CaseRow]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for row in rows {
        for reason in &row.reasons {
            *counts.entry(reason.clone()).or_insert(0) += 1;
        }
    }
    counts
}

fn profile_tuple(rows: &[CaseRow]) -> (i64, i64) {
    let pass = rows.iter().filter(|r| r.status == RunStatus::Pass).count() as i64;
    let fail = rows.iter().filter(|r| r.status == RunStatus::Fail).count() as i64;
    (pass, -fail)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, status: RunStatus, reasons: &[&str]) -> CaseRow {
        CaseRow {
            name: name.to_string(),
            source: "src.json".to_string(),
            status,
            delta: Some(DeltaRelation::Unchanged),
            safety_guard_triggered: false,
            retry_used: false,
            planner_backend: "rule".to_string(),
            reasons: reasons.iter().map(|s| (*s).to_string()).collect(),
            json_path: "out.json".to_string(),
            policy_profile: None,
        }
    }

    #[test]
    fn strict_downgrade_rate_counts_pass_to_non_pass() {
        let from = vec![
            row("a", RunStatus::Pass, &[]),
            row("b", RunStatus::Pass, &[]),
            row("c", RunStatus::Fail, &["gate_not_pass"]),
            row("d", RunStatus::Pass, &[]),
        ];
        let to = vec![
            row("a", RunStatus::Fail, &["gate_not_pass"]),
            row("b", RunStatus::Pass, &[]),
            row("c", RunStatus::Fail, &["gate_not_pass"]),
            row("d", RunStatus::NeedsReview, &["performance_regression_detected"]),
        ];
        let compare = compare_profiles(&from, &to, "default_policy", "industrial_strict");
        assert_eq!(compare.total_compared_cases, 4);
        assert_eq!(compare.downgrade_count, 2);
        assert_eq!(compare.strict_downgrade_rate, 0.5);
        assert_eq!(compare.recommended_profile, "default_policy");
    }

    #[test]
    fn reason_distribution_tracks_new_and_resolved() {
        let from = vec![row("a", RunStatus::Fail, &["gate_not_pass"])];
        let to = vec![row("a", RunStatus::Fail, &["strict_backend_mismatch"])];
        let compare = compare_profiles(&from, &to, "p1", "p2");
        assert_eq!(
            compare.reason_distribution.new_reasons_in_to,
            vec!["strict_backend_mismatch"]
        );
        assert_eq!(compare.reason_distribution.resolved_reasons_in_to, vec!["gate_not_pass"]);
        assert_eq!(
            compare.reason_distribution.delta_counts.get("gate_not_pass"),
            Some(&-1)
        );
    }

    #[test]
    fn recommended_profile_uses_lexicographic_tuple() {
        let from = vec![
            row("a", RunStatus::Pass, &[]),
            row("b", RunStatus::Fail, &["x"]),
        ];
        let to = vec![row("a", RunStatus::Pass, &[]), row("b", RunStatus::NeedsReview, &["y"])];
        // Same pass count; fewer fails wins.
        let compare = compare_profiles(&from, &to, "p1", "p2");
        assert_eq!(compare.recommended_profile, "p2");
    }

    #[test]
    fn safe_case_names_strip_path_noise() {
        assert_eq!(safe_case_name("01 fix/plan"), "01_fix_plan");
        assert_eq!(safe_case_name("///"), "case");
    }

    #[test]
    fn pack_without_cases_is_rejected() {
        let pack = RepairPack {
            pack_id: "p".to_string(),
            generated_from: None,
            cases: Vec::new(),
        };
        assert!(pack.validate().is_err());
    }
}
