// gateforge-pipeline/src/review.rs
// ============================================================================
// Module: GateForge Review Resolution and Ledger
// Description: Resolve NEEDS_REVIEW summaries and maintain the review ledger.
// Purpose: Convert human decisions into final statuses with an audit trail.
// Dependencies: gateforge-core, chrono, serde
// ============================================================================

//! ## Overview
//! `resolve_review` joins a NEEDS_REVIEW run summary with a human review
//! decision: approve resolves to PASS, reject to FAIL, and a high-risk
//! approval without a distinct approving second reviewer stays NEEDS_REVIEW
//! with the `needs_second_reviewer` reason. Every resolution appends one
//! line to the append-only review ledger.
//!
//! The ledger side derives the operational KPIs: approval and failure rates,
//! risk × status counts, a last-7-days volume series (earliest first),
//! resolution latency (average and p95 seconds), SLA breaches, guardrail
//! failure rate, review recovery rate, and the strict-profile non-pass rate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use gateforge_core::ReviewDecision;
use gateforge_core::ReviewVerdict;
use gateforge_core::RunStatus;
use gateforge_core::JsonlLedger;
use gateforge_core::core::review::parse_utc;
use gateforge_core::io::read_json;
use gateforge_core::io::read_jsonl;
use gateforge_core::io::write_json_atomic;
use gateforge_core::io::write_text;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::backend::default_md_path;
use crate::error::PipelineError;
use crate::report;

// ============================================================================
// SECTION: Resolution Model
// ============================================================================

/// Result of resolving a review against its source summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    /// Proposal identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    /// Source summary status.
    pub source_status: RunStatus,
    /// Source policy decision label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_policy_decision: Option<String>,
    /// Review identifier.
    pub review_id: String,
    /// Primary reviewer.
    pub reviewer: String,
    /// Second reviewer, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_reviewer: Option<String>,
    /// Primary human decision.
    pub human_decision: ReviewVerdict,
    /// Whether every required check was completed.
    pub all_required_checks_completed: bool,
    /// Required checks carried by the source.
    pub source_required_human_checks: Vec<String>,
    /// Final status after resolution.
    pub final_status: RunStatus,
    /// Reasons attached to the final status.
    pub final_reasons: Vec<String>,
    /// Required checks left unresolved, when checks were incomplete.
    pub unresolved_required_human_checks: Vec<String>,
    /// Seconds between review request and completion, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_seconds: Option<f64>,
}

/// One review ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// UTC timestamp of the resolution.
    pub recorded_at_utc: String,
    /// Proposal identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    /// Review identifier.
    pub review_id: String,
    /// Primary reviewer.
    pub reviewer: String,
    /// Second reviewer, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_reviewer: Option<String>,
    /// Primary human decision.
    pub human_decision: ReviewVerdict,
    /// Final status after resolution.
    pub final_status: RunStatus,
    /// Reasons attached to the final status.
    pub final_reasons: Vec<String>,
    /// Risk level of the source proposal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    /// Source summary status label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_status: Option<String>,
    /// Source policy decision label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_policy_decision: Option<String>,
    /// Number of required human checks on the source.
    pub required_human_checks_count: usize,
    /// Seconds between review request and completion, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_seconds: Option<f64>,
    /// Policy profile active on the source run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_profile: Option<String>,
    /// Policy version active on the source run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    /// Planner guardrail decision on the source run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_guardrail_decision: Option<String>,
    /// Planner guardrail rule ids on the source run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planner_guardrail_rule_ids: Vec<String>,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves a review decision against its source summary.
#[must_use]
pub fn resolve_review(source: &Value, review: &ReviewDecision) -> ResolutionSummary {
    let proposal_id = source.get("proposal_id").and_then(Value::as_str).map(str::to_string);
    let source_status = RunStatus::from_label(
        source.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN"),
    );
    let required_checks: Vec<String> = source
        .get("required_human_checks")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let risk_level = source.get("risk_level").and_then(Value::as_str).unwrap_or("low");

    let mut summary = ResolutionSummary {
        proposal_id: proposal_id.clone(),
        source_status,
        source_policy_decision: source
            .get("policy_decision")
            .and_then(Value::as_str)
            .map(str::to_string),
        review_id: review.review_id.clone(),
        reviewer: review.reviewer.clone(),
        second_reviewer: review.second_reviewer.clone(),
        human_decision: review.decision,
        all_required_checks_completed: review.all_required_checks_completed,
        source_required_human_checks: required_checks.clone(),
        final_status: RunStatus::Fail,
        final_reasons: Vec::new(),
        unresolved_required_human_checks: Vec::new(),
        resolution_seconds: review.resolution_seconds(),
    };

    if proposal_id.as_deref() != Some(review.proposal_id.as_str()) {
        summary.final_reasons.push("review_proposal_id_mismatch".to_string());
        return summary;
    }

    // A source that is already final stays final unless explicitly rejected.
    if matches!(source_status, RunStatus::Pass | RunStatus::Fail) {
        if review.decision == ReviewVerdict::Reject {
            summary.final_reasons.push("human_rejected".to_string());
        } else {
            summary.final_status = source_status;
            if source_status == RunStatus::Fail {
                summary.final_reasons.push("source_already_fail".to_string());
            }
        }
        return summary;
    }

    if source_status != RunStatus::NeedsReview {
        summary.final_reasons.push("source_not_reviewable".to_string());
        return summary;
    }

    if review.decision == ReviewVerdict::Reject {
        summary.final_reasons.push("human_rejected".to_string());
        return summary;
    }

    // High-risk approvals require a distinct, approving second reviewer;
    // without one the proposal stays in review rather than failing.
    if risk_level == "high" {
        let second_ok = review
            .second_reviewer
            .as_deref()
            .is_some_and(|second| !second.trim().is_empty() && second != review.reviewer)
            && review.second_decision == Some(ReviewVerdict::Approve);
        if !second_ok {
            summary.final_status = RunStatus::NeedsReview;
            summary.final_reasons.push("needs_second_reviewer".to_string());
            return summary;
        }
    }

    if !review.all_required_checks_completed {
        summary.final_reasons.push("required_human_checks_not_completed".to_string());
        summary.unresolved_required_human_checks = required_checks;
        return summary;
    }

    summary.final_status = RunStatus::Pass;
    summary
}

/// Builds the ledger record for a resolution.
#[must_use]
pub fn ledger_record(
    source: &Value,
    resolution: &ResolutionSummary,
    recorded_at: DateTime<Utc>,
) -> LedgerRecord {
    let guardrail_rule_ids = source
        .get("planner_guardrail_violations")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|v| v.get("rule_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    LedgerRecord {
        recorded_at_utc: recorded_at.to_rfc3339(),
        proposal_id: resolution.proposal_id.clone(),
        review_id: resolution.review_id.clone(),
        reviewer: resolution.reviewer.clone(),
        second_reviewer: resolution.second_reviewer.clone(),
        human_decision: resolution.human_decision,
        final_status: resolution.final_status,
        final_reasons: resolution.final_reasons.clone(),
        risk_level: source.get("risk_level").and_then(Value::as_str).map(str::to_string),
        source_status: source.get("status").and_then(Value::as_str).map(str::to_string),
        source_policy_decision: source
            .get("policy_decision")
            .and_then(Value::as_str)
            .map(str::to_string),
        required_human_checks_count: resolution.source_required_human_checks.len(),
        resolution_seconds: resolution.resolution_seconds,
        policy_profile: source
            .pointer("/toolchain/policy_profile")
            .and_then(Value::as_str)
            .map(str::to_string),
        policy_version: source
            .pointer("/toolchain/policy_version")
            .and_then(Value::as_str)
            .map(str::to_string),
        planner_guardrail_decision: source
            .get("planner_guardrail_decision")
            .and_then(Value::as_str)
            .map(str::to_string),
        planner_guardrail_rule_ids: guardrail_rule_ids,
    }
}

/// Resolves a review from artifact paths and appends to the ledger.
///
/// # Errors
///
/// Returns [`PipelineError`] on read, validation, or write failure.
pub fn resolve_review_files(
    summary_path: &Path,
    review_path: &Path,
    out_path: &Path,
    report_path: Option<&Path>,
    ledger_path: &Path,
) -> Result<ResolutionSummary, PipelineError> {
    let source: Value = read_json(summary_path)?;
    // Wrapper summaries may point at the real run summary.
    let source = match source.get("run_path").and_then(Value::as_str) {
        Some(run_path) if Path::new(run_path).exists() => read_json(Path::new(run_path))?,
        _ => source,
    };
    let review: ReviewDecision = read_json(review_path)?;
    review.validate()?;

    let resolution = resolve_review(&source, &review);
    write_json_atomic(out_path, &resolution)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::resolution_markdown(&resolution))?;

    let record = ledger_record(&source, &resolution, Utc::now());
    let ledger = JsonlLedger::open(ledger_path)?;
    ledger.append(&record)?;
    tracing::info!(
        proposal_id = ?resolution.proposal_id,
        final_status = %resolution.final_status,
        "review resolved and recorded"
    );
    Ok(resolution)
}

// ============================================================================
// SECTION: Ledger Filters
// ============================================================================

/// Record filter for ledger queries and exports.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    /// Keep records with this final status.
    pub final_status: Option<RunStatus>,
    /// Keep records for this proposal.
    pub proposal_id: Option<String>,
    /// Keep records recorded at or after this instant.
    pub since_utc: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    /// Returns true when the record matches every active filter.
    #[must_use]
    pub fn matches(&self, record: &LedgerRecord) -> bool {
        if let Some(status) = self.final_status {
            if record.final_status != status {
                return false;
            }
        }
        if let Some(proposal_id) = &self.proposal_id {
            if record.proposal_id.as_deref() != Some(proposal_id.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since_utc {
            match parse_utc(&record.recorded_at_utc) {
                Some(recorded) if recorded >= since => {}
                _ => return false,
            }
        }
        true
    }
}

/// Loads ledger records matching a filter.
///
/// # Errors
///
/// Returns [`PipelineError`] on read failure.
pub fn load_ledger(
    ledger_path: &Path,
    filter: &LedgerFilter,
) -> Result<Vec<LedgerRecord>, PipelineError> {
    let rows: Vec<LedgerRecord> = read_jsonl(ledger_path)?;
    Ok(rows.into_iter().filter(|r| filter.matches(r)).collect())
}

/// Exports matching records to a JSONL file.
///
/// # Errors
///
/// Returns [`PipelineError`] on write failure.
pub fn export_ledger(records: &[LedgerRecord], out_path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| PipelineError::Input(format!("export directory: {err}")))?;
    }
    let mut body = String::new();
    for record in records {
        body.push_str(
            &serde_json::to_string(record)
                .map_err(|err| PipelineError::Input(format!("export serialization: {err}")))?,
        );
        body.push('\n');
    }
    std::fs::write(out_path, body)
        .map_err(|err| PipelineError::Input(format!("export write: {err}")))?;
    Ok(())
}

// ============================================================================
// SECTION: KPIs
// ============================================================================

/// Default SLA for review resolution, in seconds.
pub const DEFAULT_SLA_SECONDS: f64 = 86_400.0;

/// Derived ledger KPIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerKpis {
    /// Fraction of records with an approve decision.
    pub approval_rate: f64,
    /// Fraction of records with final status FAIL.
    pub fail_rate: f64,
    /// Record counts keyed by risk level then final status.
    pub risk_status_counts: BTreeMap<String, BTreeMap<String, u64>>,
    /// One integer per day over the trailing week, earliest first.
    pub last_7_days_volume: Vec<u64>,
    /// Mean resolution latency in seconds, over records that carry one.
    pub resolution_latency_avg_seconds: f64,
    /// 95th-percentile resolution latency in seconds.
    pub resolution_latency_p95_seconds: f64,
    /// Fraction of timed records breaching the SLA.
    pub sla_breach_rate: f64,
    /// Fraction of records whose source run failed planner guardrails.
    pub guardrail_fail_rate: f64,
    /// Fraction of NEEDS_REVIEW sources that resolved to PASS.
    pub review_recovery_rate: f64,
    /// Non-PASS fraction among records under a strict policy profile.
    pub strict_non_pass_rate: f64,
    /// Guardrail rule-id distribution.
    pub rule_id_counts: BTreeMap<String, u64>,
    /// Policy profile distribution.
    pub policy_profile_counts: BTreeMap<String, u64>,
}

/// Ledger summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// UTC timestamp of summary generation.
    pub generated_at_utc: String,
    /// Total records after filtering.
    pub total_records: usize,
    /// Final status counts.
    pub status_counts: BTreeMap<String, u64>,
    /// Reviewer counts.
    pub reviewer_counts: BTreeMap<String, u64>,
    /// Reason-prefix counts over final reasons.
    pub reason_prefix_counts: BTreeMap<String, u64>,
    /// Derived KPIs.
    pub kpis: LedgerKpis,
    /// SLA used for breach accounting, in seconds.
    pub sla_seconds: f64,
}

/// Summarizes ledger records into KPIs.
#[must_use]
pub fn summarize_ledger(
    records: &[LedgerRecord],
    sla_seconds: f64,
    now: DateTime<Utc>,
) -> LedgerSummary {
    let total = records.len();
    let mut status_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut reviewer_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut reason_prefix_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut risk_status_counts: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut rule_id_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut policy_profile_counts: BTreeMap<String, u64> = BTreeMap::new();

    let mut approvals = 0_usize;
    let mut fails = 0_usize;
    let mut volume = vec![0_u64; 7];
    let mut latencies: Vec<f64> = Vec::new();
    let mut breaches = 0_usize;
    let mut guardrail_fails = 0_usize;
    let mut review_sources = 0_usize;
    let mut review_recovered = 0_usize;
    let mut strict_records = 0_usize;
    let mut strict_non_pass = 0_usize;

    for record in records {
        *status_counts.entry(record.final_status.as_str().to_string()).or_insert(0) += 1;
        *reviewer_counts.entry(record.reviewer.clone()).or_insert(0) += 1;
        for reason in &record.final_reasons {
            let prefix = reason.split(':').next().unwrap_or(reason).to_string();
            *reason_prefix_counts.entry(prefix).or_insert(0) += 1;
        }
        let risk = record.risk_level.clone().unwrap_or_else(|| "unknown".to_string());
        *risk_status_counts
            .entry(risk)
            .or_default()
            .entry(record.final_status.as_str().to_string())
            .or_insert(0) += 1;
        for rule_id in &record.planner_guardrail_rule_ids {
            *rule_id_counts.entry(rule_id.clone()).or_insert(0) += 1;
        }
        if let Some(profile) = &record.policy_profile {
            *policy_profile_counts.entry(profile.clone()).or_insert(0) += 1;
            if profile.contains("strict") {
                strict_records += 1;
                if record.final_status != RunStatus::Pass {
                    strict_non_pass += 1;
                }
            }
        }

        if record.human_decision == ReviewVerdict::Approve {
            approvals += 1;
        }
        if record.final_status == RunStatus::Fail {
            fails += 1;
        }
        if record.planner_guardrail_decision.as_deref() == Some("FAIL") {
            guardrail_fails += 1;
        }
        if record.source_status.as_deref() == Some("NEEDS_REVIEW") {
            review_sources += 1;
            if record.final_status == RunStatus::Pass {
                review_recovered += 1;
            }
        }
        if let Some(latency) = record.resolution_seconds {
            latencies.push(latency);
            if latency > sla_seconds {
                breaches += 1;
            }
        }
        if let Some(recorded) = parse_utc(&record.recorded_at_utc) {
            let age_days = (now - recorded).num_days();
            if (0..7).contains(&age_days) {
                // Bucket 6 is today, bucket 0 the earliest day of the window.
                volume[(6 - age_days) as usize] += 1;
            }
        }
    }

    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let latency_avg = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<f64>() / latencies.len() as f64
    };
    let latency_p95 = if latencies.is_empty() {
        0.0
    } else {
        let rank = ((latencies.len() as f64) * 0.95).ceil() as usize;
        latencies[rank.clamp(1, latencies.len()) - 1]
    };

    let rate = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    LedgerSummary {
        generated_at_utc: now.to_rfc3339(),
        total_records: total,
        status_counts,
        reviewer_counts,
        reason_prefix_counts,
        kpis: LedgerKpis {
            approval_rate: rate(approvals, total),
            fail_rate: rate(fails, total),
            risk_status_counts,
            last_7_days_volume: volume,
            resolution_latency_avg_seconds: latency_avg,
            resolution_latency_p95_seconds: latency_p95,
            sla_breach_rate: rate(breaches, latencies.len()),
            guardrail_fail_rate: rate(guardrail_fails, total),
            review_recovery_rate: if review_sources == 0 {
                1.0
            } else {
                rate(review_recovered, review_sources)
            },
            strict_non_pass_rate: rate(strict_non_pass, strict_records),
            rule_id_counts,
            policy_profile_counts,
        },
        sla_seconds,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn review(decision: ReviewVerdict) -> ReviewDecision {
        ReviewDecision {
            schema_version: "0.1.0".to_string(),
            review_id: "rev-1".to_string(),
            proposal_id: "prop-1".to_string(),
            reviewer: "alice".to_string(),
            decision,
            rationale: "checked".to_string(),
            all_required_checks_completed: true,
            confirmed_checks: Vec::new(),
            second_reviewer: None,
            second_decision: None,
            requested_at_utc: Some("2026-01-01T00:00:00Z".to_string()),
            reviewed_at_utc: Some("2026-01-01T01:00:00Z".to_string()),
        }
    }

    fn needs_review_source(risk: &str) -> Value {
        json!({
            "proposal_id": "prop-1",
            "status": "NEEDS_REVIEW",
            "policy_decision": "NEEDS_REVIEW",
            "risk_level": risk,
            "required_human_checks": ["Check the runtime trend."],
        })
    }

    #[test]
    fn approve_resolves_to_pass() {
        let resolution = resolve_review(&needs_review_source("low"), &review(ReviewVerdict::Approve));
        assert_eq!(resolution.final_status, RunStatus::Pass);
        assert!(resolution.final_reasons.is_empty());
    }

    #[test]
    fn reject_resolves_to_fail() {
        let resolution = resolve_review(&needs_review_source("low"), &review(ReviewVerdict::Reject));
        assert_eq!(resolution.final_status, RunStatus::Fail);
        assert_eq!(resolution.final_reasons, vec!["human_rejected"]);
    }

    #[test]
    fn high_risk_approve_without_second_reviewer_stays_in_review() {
        let resolution =
            resolve_review(&needs_review_source("high"), &review(ReviewVerdict::Approve));
        assert_eq!(resolution.final_status, RunStatus::NeedsReview);
        assert_eq!(resolution.final_reasons, vec!["needs_second_reviewer"]);
    }

    #[test]
    fn high_risk_approve_with_second_approval_passes() {
        let mut r = review(ReviewVerdict::Approve);
        r.second_reviewer = Some("bob".to_string());
        r.second_decision = Some(ReviewVerdict::Approve);
        let resolution = resolve_review(&needs_review_source("high"), &r);
        assert_eq!(resolution.final_status, RunStatus::Pass);
    }

    #[test]
    fn duplicate_second_reviewer_does_not_satisfy_dual_review() {
        let mut r = review(ReviewVerdict::Approve);
        r.second_reviewer = Some("alice".to_string());
        r.second_decision = Some(ReviewVerdict::Approve);
        let resolution = resolve_review(&needs_review_source("high"), &r);
        assert_eq!(resolution.final_status, RunStatus::NeedsReview);
        assert_eq!(resolution.final_reasons, vec!["needs_second_reviewer"]);
    }

    #[test]
    fn proposal_id_mismatch_fails() {
        let mut r = review(ReviewVerdict::Approve);
        r.proposal_id = "other".to_string();
        let resolution = resolve_review(&needs_review_source("low"), &r);
        assert_eq!(resolution.final_status, RunStatus::Fail);
        assert_eq!(resolution.final_reasons, vec!["review_proposal_id_mismatch"]);
    }

    #[test]
    fn incomplete_checks_fail_with_unresolved_list() {
        let mut r = review(ReviewVerdict::Approve);
        r.all_required_checks_completed = false;
        let resolution = resolve_review(&needs_review_source("low"), &r);
        assert_eq!(resolution.final_status, RunStatus::Fail);
        assert_eq!(resolution.final_reasons, vec!["required_human_checks_not_completed"]);
        assert_eq!(resolution.unresolved_required_human_checks.len(), 1);
    }

    fn record(
        final_status: RunStatus,
        source_status: &str,
        risk: &str,
        profile: Option<&str>,
        latency: Option<f64>,
        days_ago: i64,
        now: DateTime<Utc>,
    ) -> LedgerRecord {
        LedgerRecord {
            recorded_at_utc: (now - Duration::days(days_ago)).to_rfc3339(),
            proposal_id: Some("prop-1".to_string()),
            review_id: "rev".to_string(),
            reviewer: "alice".to_string(),
            second_reviewer: None,
            human_decision: if final_status == RunStatus::Fail {
                ReviewVerdict::Reject
            } else {
                ReviewVerdict::Approve
            },
            final_status,
            final_reasons: Vec::new(),
            risk_level: Some(risk.to_string()),
            source_status: Some(source_status.to_string()),
            source_policy_decision: Some(source_status.to_string()),
            required_human_checks_count: 1,
            resolution_seconds: latency,
            policy_profile: profile.map(str::to_string),
            policy_version: None,
            planner_guardrail_decision: None,
            planner_guardrail_rule_ids: Vec::new(),
        }
    }

    #[test]
    fn kpis_cover_rates_volume_and_latency() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        let records = vec![
            record(RunStatus::Pass, "NEEDS_REVIEW", "low", Some("default_policy"), Some(600.0), 0, now),
            record(RunStatus::Fail, "NEEDS_REVIEW", "medium", Some("industrial_strict"), Some(100_000.0), 1, now),
            record(RunStatus::Pass, "NEEDS_REVIEW", "high", Some("industrial_strict"), Some(1200.0), 6, now),
            record(RunStatus::Fail, "NEEDS_REVIEW", "low", None, None, 10, now),
        ];
        let summary = summarize_ledger(&records, DEFAULT_SLA_SECONDS, now);
        assert_eq!(summary.total_records, 4);
        assert_eq!(summary.kpis.fail_rate, 0.5);
        assert_eq!(summary.kpis.approval_rate, 0.5);
        assert_eq!(summary.kpis.review_recovery_rate, 0.5);
        // One of two strict-profile records ended non-PASS.
        assert_eq!(summary.kpis.strict_non_pass_rate, 0.5);
        // Day buckets: 6 days ago is the first slot, today the last.
        assert_eq!(summary.kpis.last_7_days_volume[0], 1);
        assert_eq!(summary.kpis.last_7_days_volume[5], 1);
        assert_eq!(summary.kpis.last_7_days_volume[6], 1);
        assert_eq!(summary.kpis.last_7_days_volume.iter().sum::<u64>(), 3);
        // One of three timed records breached the default SLA.
        assert!((summary.kpis.sla_breach_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!(summary.kpis.resolution_latency_p95_seconds >= 1200.0);
    }

    #[test]
    fn filter_selects_matching_subset() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        let records = vec![
            record(RunStatus::Pass, "NEEDS_REVIEW", "low", None, None, 0, now),
            record(RunStatus::Fail, "NEEDS_REVIEW", "low", None, None, 0, now),
        ];
        let filter = LedgerFilter {
            final_status: Some(RunStatus::Fail),
            ..LedgerFilter::default()
        };
        let matched: Vec<&LedgerRecord> =
            records.iter().filter(|r| filter.matches(r)).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].final_status, RunStatus::Fail);
    }
}
