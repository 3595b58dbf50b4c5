// gateforge-pipeline/src/history.rs
// ============================================================================
// Module: GateForge Governance History
// Description: Snapshot recording and trend windows over index.jsonl.
// Purpose: Track governance status over time and alert on worsening streaks.
// Dependencies: gateforge-core, chrono, serde
// ============================================================================

//! ## Overview
//! Each recorded snapshot is copied next to the append-only `index.jsonl`
//! with a canonical digest; the index row carries label, status, risks, and
//! KPIs. The last-N window summary derives transition KPIs and raises a
//! `consecutive_worsening_detected` alert when the tail of the window has
//! been strictly worsening for the configured threshold (default 3).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use gateforge_core::JsonlLedger;
use gateforge_core::RunStatus;
use gateforge_core::hash_canonical_json;
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
// SECTION: Constants
// ============================================================================

/// Default trend window size.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Default worsening-streak alert threshold.
pub const DEFAULT_WORSE_STREAK_THRESHOLD: usize = 3;

// ============================================================================
// SECTION: Record Model
// ============================================================================

/// One history index row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// UTC timestamp of recording.
    pub recorded_at_utc: String,
    /// Original snapshot path.
    pub snapshot_path: String,
    /// Archived snapshot copy path.
    pub snapshot_copy_path: String,
    /// Canonical digest of the snapshot payload.
    pub digest: String,
    /// Optional label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Snapshot status label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Snapshot risks.
    #[serde(default)]
    pub risks: Vec<String>,
    /// Snapshot KPIs, preserved verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpis: Option<Value>,
}

/// One window transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTransition {
    /// Status before.
    pub from: String,
    /// Status after.
    pub to: String,
    /// `improved` / `worse` / `unchanged`.
    pub relation: String,
    /// Timestamp of the earlier record.
    pub from_recorded_at_utc: String,
    /// Timestamp of the later record.
    pub to_recorded_at_utc: String,
}

/// Transition KPIs over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransitionKpis {
    /// Number of transitions in the window.
    pub transition_count: usize,
    /// Improving transitions.
    pub better_count: usize,
    /// Worsening transitions.
    pub worse_count: usize,
    /// Unchanged transitions.
    pub unchanged_count: usize,
    /// Longest worsening streak in the window.
    pub max_worse_streak: usize,
    /// Worsening streak at the window tail.
    pub latest_worse_streak: usize,
    /// Threshold used for the alert.
    pub worse_streak_threshold: usize,
}

/// History window summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Total records in the index.
    pub total_records: usize,
    /// Records in the window.
    pub window_size: usize,
    /// Earliest window timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start_utc: Option<String>,
    /// Latest window timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end_utc: Option<String>,
    /// Status counts over the window.
    pub status_counts: BTreeMap<String, u64>,
    /// Risk counts over the window.
    pub risk_counts: BTreeMap<String, u64>,
    /// Transitions in window order.
    pub transitions: Vec<HistoryTransition>,
    /// Transition KPIs.
    pub transition_kpis: TransitionKpis,
    /// Latest window status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_status: Option<String>,
    /// Raised alerts.
    pub alerts: Vec<String>,
    /// Record appended during this invocation, when one was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_record: Option<HistoryRecord>,
}

// ============================================================================
// SECTION: Recording
// ============================================================================

/// Records a snapshot into the history directory.
///
/// # Errors
///
/// Returns [`PipelineError`] on read, hash, or write failure.
pub fn record_snapshot(
    snapshot_path: &Path,
    history_dir: &Path,
    label: Option<&str>,
    now: DateTime<Utc>,
) -> Result<HistoryRecord, PipelineError> {
    let payload: Value = read_json(snapshot_path)?;
    let digest = hash_canonical_json(&payload)?.value;
    let short = &digest[..12.min(digest.len())];
    let stamp: String =
        now.to_rfc3339().chars().filter(|c| *c != ':' && *c != '-').collect();
    let copy_path = history_dir.join(format!("{stamp}_{short}.json"));

    let record = HistoryRecord {
        recorded_at_utc: now.to_rfc3339(),
        snapshot_path: snapshot_path.display().to_string(),
        snapshot_copy_path: copy_path.display().to_string(),
        digest,
        label: label.map(str::to_string),
        status: payload.get("status").and_then(Value::as_str).map(str::to_string),
        risks: payload
            .get("risks")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        kpis: payload.get("kpis").cloned(),
    };

    let wrapper = serde_json::json!({"record": record, "snapshot": payload});
    write_json_atomic(&copy_path, &wrapper)?;
    let index = JsonlLedger::open(&history_dir.join("index.jsonl"))?;
    index.append(&record)?;
    Ok(record)
}

/// Loads history records ordered by label then timestamp.
///
/// # Errors
///
/// Returns [`PipelineError`] on read failure.
pub fn load_history(history_dir: &Path) -> Result<Vec<HistoryRecord>, PipelineError> {
    let mut rows: Vec<HistoryRecord> = read_jsonl(&history_dir.join("index.jsonl"))?;
    rows.sort_by(|a, b| {
        (a.label.as_deref().unwrap_or(""), a.recorded_at_utc.as_str())
            .cmp(&(b.label.as_deref().unwrap_or(""), b.recorded_at_utc.as_str()))
    });
    Ok(rows)
}

// ============================================================================
// SECTION: Window Summary
// ============================================================================

/// Summarizes the last-N history window.
#[must_use]
pub fn summarize_window(
    records: &[HistoryRecord],
    last_n: usize,
    worse_streak_threshold: usize,
) -> HistorySummary {
    let window = last_n.max(1);
    let start = records.len().saturating_sub(window);
    let items = &records[start..];

    let mut status_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut risk_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut transitions = Vec::new();

    for (i, row) in items.iter().enumerate() {
        let status = row.status.clone().unwrap_or_else(|| "UNKNOWN".to_string());
        *status_counts.entry(status.clone()).or_insert(0) += 1;
        for risk in &row.risks {
            *risk_counts.entry(risk.clone()).or_insert(0) += 1;
        }
        if i > 0 {
            let prev = items[i - 1].status.clone().unwrap_or_else(|| "UNKNOWN".to_string());
            let prev_score = RunStatus::from_label(&prev).score();
            let curr_score = RunStatus::from_label(&status).score();
            let relation = if curr_score > prev_score {
                "improved"
            } else if curr_score < prev_score {
                "worse"
            } else {
                "unchanged"
            };
            transitions.push(HistoryTransition {
                from: prev,
                to: status.clone(),
                relation: relation.to_string(),
                from_recorded_at_utc: items[i - 1].recorded_at_utc.clone(),
                to_recorded_at_utc: row.recorded_at_utc.clone(),
            });
        }
    }

    let better_count = transitions.iter().filter(|t| t.relation == "improved").count();
    let worse_count = transitions.iter().filter(|t| t.relation == "worse").count();
    let unchanged_count = transitions.iter().filter(|t| t.relation == "unchanged").count();

    let mut max_worse_streak = 0_usize;
    let mut current = 0_usize;
    for t in &transitions {
        if t.relation == "worse" {
            current += 1;
            max_worse_streak = max_worse_streak.max(current);
        } else {
            current = 0;
        }
    }
    let latest_worse_streak =
        transitions.iter().rev().take_while(|t| t.relation == "worse").count();

    // The alert watches the window tail: only an ongoing worsening run
    // counts, not one that already recovered.
    let threshold = worse_streak_threshold.max(1);
    let mut alerts = Vec::new();
    if latest_worse_streak >= threshold {
        alerts.push("consecutive_worsening_detected".to_string());
    }

    HistorySummary {
        total_records: records.len(),
        window_size: items.len(),
        window_start_utc: items.first().map(|r| r.recorded_at_utc.clone()),
        window_end_utc: items.last().map(|r| r.recorded_at_utc.clone()),
        status_counts,
        risk_counts,
        transitions,
        transition_kpis: TransitionKpis {
            transition_count: better_count + worse_count + unchanged_count,
            better_count,
            worse_count,
            unchanged_count,
            max_worse_streak,
            latest_worse_streak,
            worse_streak_threshold: threshold,
        },
        latest_status: items.last().and_then(|r| r.status.clone()),
        alerts,
        last_record: None,
    }
}

/// Records an optional snapshot, then summarizes the window and writes it.
///
/// # Errors
///
/// Returns [`PipelineError`] on read or write failure.
pub fn summarize_history(
    history_dir: &Path,
    snapshot: Option<&Path>,
    label: Option<&str>,
    last_n: usize,
    worse_streak_threshold: usize,
    out_path: &Path,
    report_path: Option<&Path>,
) -> Result<HistorySummary, PipelineError> {
    let recorded = match snapshot {
        Some(snapshot) => Some(record_snapshot(snapshot, history_dir, label, Utc::now())?),
        None => None,
    };
    let records = load_history(history_dir)?;
    let mut summary = summarize_window(&records, last_n, worse_streak_threshold);
    summary.last_record = recorded;

    write_json_atomic(out_path, &summary)?;
    let md_path = report_path.map(Path::to_path_buf).unwrap_or_else(|| default_md_path(out_path));
    write_text(&md_path, &report::history_markdown(&summary))?;
    Ok(summary)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn record_with_status(ts: &str, status: &str) -> HistoryRecord {
        HistoryRecord {
            recorded_at_utc: ts.to_string(),
            snapshot_path: "s.json".to_string(),
            snapshot_copy_path: "copy.json".to_string(),
            digest: "d".to_string(),
            label: None,
            status: Some(status.to_string()),
            risks: Vec::new(),
            kpis: None,
        }
    }

    #[test]
    fn recording_appends_index_line_and_copy() {
        let dir = TempDir::new().expect("tempdir");
        let snapshot_path = dir.path().join("snapshot.json");
        write_json_atomic(
            &snapshot_path,
            &json!({"status": "PASS", "risks": [], "kpis": {"fail_rate": 0.0}}),
        )
        .expect("snapshot");
        let history = dir.path().join("history");
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let record = record_snapshot(&snapshot_path, &history, Some("nightly"), now)
            .expect("record");
        assert_eq!(record.status.as_deref(), Some("PASS"));
        assert_eq!(record.digest.len(), 64);
        assert!(Path::new(&record.snapshot_copy_path).exists());
        let rows = load_history(&history).expect("load");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn window_counts_transitions() {
        let records = vec![
            record_with_status("2026-01-01T00:00:00Z", "PASS"),
            record_with_status("2026-01-02T00:00:00Z", "NEEDS_REVIEW"),
            record_with_status("2026-01-03T00:00:00Z", "FAIL"),
            record_with_status("2026-01-04T00:00:00Z", "PASS"),
        ];
        let summary = summarize_window(&records, 4, DEFAULT_WORSE_STREAK_THRESHOLD);
        assert_eq!(summary.transition_kpis.transition_count, 3);
        assert_eq!(summary.transition_kpis.worse_count, 2);
        assert_eq!(summary.transition_kpis.better_count, 1);
        assert_eq!(summary.latest_status.as_deref(), Some("PASS"));
        assert!(summary.alerts.is_empty());
    }

    #[test]
    fn worsening_streak_raises_alert_at_threshold() {
        let records = vec![
            record_with_status("2026-01-01T00:00:00Z", "PASS"),
            record_with_status("2026-01-02T00:00:00Z", "NEEDS_REVIEW"),
            record_with_status("2026-01-03T00:00:00Z", "FAIL"),
        ];
        // Two consecutive worsening steps; alert only when threshold is 2.
        let quiet = summarize_window(&records, 3, 3);
        assert!(quiet.alerts.is_empty());
        let alerting = summarize_window(&records, 3, 2);
        assert_eq!(alerting.alerts, vec!["consecutive_worsening_detected"]);
        assert_eq!(alerting.transition_kpis.latest_worse_streak, 2);
    }
}
