// gateforge-pipeline/src/backend.rs
// ============================================================================
// Module: GateForge Backend Adapters
// Description: Runner implementations producing candidate evidence.
// Purpose: Execute a backend once and normalize the result into evidence.
// Dependencies: gateforge-core, gateforge-config, chrono, tempfile, uuid
// ============================================================================

//! ## Overview
//! A `Runner` executes one backend invocation inside a scoped temporary
//! workspace and reports normalized flags. `run_smoke` wraps a runner into
//! the evidence contract: it times the execution, derives the structural
//! gate, validates invariants, and atomically writes the artifact. Backend
//! children are blocking and carry a wall-clock timeout; exceeding it is a
//! `timeout` failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use chrono::Utc;
use gateforge_core::Evidence;
use gateforge_core::EvidenceArtifacts;
use gateforge_core::FailureType;
use gateforge_core::Gate;
use gateforge_core::Metrics;
use gateforge_core::RunOutcome;
use gateforge_core::Toolchain;
use gateforge_core::io::write_json_atomic;
use gateforge_core::io::write_text;
use gateforge_config::env::EnvOverrides;
use tempfile::TempDir;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::report;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default OpenModelica docker image.
pub const DEFAULT_OM_DOCKER_IMAGE: &str = "openmodelica/openmodelica:v1.26.1-minimal";

/// Default model script for probe runs.
pub const DEFAULT_OM_SCRIPT: &str = "demos/openmodelica/minimal_probe.mos";

/// Wall-clock budget for a containerized backend invocation.
const DOCKER_RUN_TIMEOUT: Duration = Duration::from_secs(40);

/// Wall-clock budget for a local probe invocation.
const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Maximum log excerpt length carried on evidence.
const LOG_EXCERPT_LIMIT: usize = 200;

// ============================================================================
// SECTION: Runner Contract
// ============================================================================

/// Normalized result of one backend invocation.
#[derive(Debug, Clone)]
pub struct RunnerReport {
    /// Terminal outcome.
    pub status: RunOutcome,
    /// Failure classification.
    pub failure_type: FailureType,
    /// Discrete event count.
    pub events: u64,
    /// Truncated log excerpt.
    pub log_excerpt: String,
    /// Model script that was executed.
    pub model_script: Option<String>,
    /// Backend process exit code.
    pub exit_code: i64,
    /// Whether the model check stage succeeded.
    pub check_ok: bool,
    /// Whether the simulate stage succeeded.
    pub simulate_ok: bool,
    /// Docker image used, when containerized.
    pub docker_image: Option<String>,
}

/// Execution backend contract.
pub trait Runner {
    /// Stable backend name recorded on evidence.
    fn name(&self) -> &'static str;

    /// Executes the backend once inside the scoped workspace.
    fn run(&self, workspace: &Path) -> RunnerReport;
}

/// Builds the runner for a backend name.
///
/// # Errors
///
/// Returns [`PipelineError::Input`] for an unsupported backend.
pub fn runner_for(
    backend: &str,
    script_path: Option<&str>,
) -> Result<Box<dyn Runner>, PipelineError> {
    match backend {
        "mock" => Ok(Box::new(MockRunner {
            script_path: script_path.map(str::to_string),
        })),
        "openmodelica" => Ok(Box::new(OpenModelicaProbeRunner)),
        "openmodelica_docker" => Ok(Box::new(OpenModelicaDockerRunner {
            script_path: script_path.map(str::to_string),
        })),
        other => Err(PipelineError::Input(format!("unsupported backend: {other}"))),
    }
}

// ============================================================================
// SECTION: Mock Runner
// ============================================================================

/// Deterministic in-process backend for demos and tests.
pub struct MockRunner {
    /// Script path echoed back onto the evidence.
    pub script_path: Option<String>,
}

impl Runner for MockRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn run(&self, _workspace: &Path) -> RunnerReport {
        RunnerReport {
            status: RunOutcome::Success,
            failure_type: FailureType::None,
            events: 12,
            log_excerpt: "mock simulation completed".to_string(),
            model_script: self.script_path.clone(),
            exit_code: 0,
            check_ok: true,
            simulate_ok: true,
            docker_image: None,
        }
    }
}

// ============================================================================
// SECTION: OpenModelica Probe Runner
// ============================================================================

/// Probes a locally installed `omc` binary.
pub struct OpenModelicaProbeRunner;

impl Runner for OpenModelicaProbeRunner {
    fn name(&self) -> &'static str {
        "openmodelica"
    }

    fn run(&self, _workspace: &Path) -> RunnerReport {
        let mut cmd = Command::new("omc");
        cmd.arg("--version");
        match run_with_timeout(cmd, PROBE_TIMEOUT) {
            Err(timeout_report) => timeout_report,
            Ok(capture) => {
                if capture.exit_code != 0 {
                    return RunnerReport {
                        status: RunOutcome::Failure,
                        failure_type: FailureType::CompileError,
                        events: 0,
                        log_excerpt: excerpt(&capture.stderr_or_stdout()),
                        model_script: None,
                        exit_code: capture.exit_code,
                        check_ok: false,
                        simulate_ok: false,
                        docker_image: None,
                    };
                }
                RunnerReport {
                    status: RunOutcome::Success,
                    failure_type: FailureType::None,
                    events: 1,
                    log_excerpt: excerpt(&capture.stdout),
                    model_script: None,
                    exit_code: capture.exit_code,
                    check_ok: true,
                    simulate_ok: true,
                    docker_image: None,
                }
            }
        }
    }
}

// ============================================================================
// SECTION: OpenModelica Docker Runner
// ============================================================================

/// Runs a model script through `omc` inside a container.
///
/// The workspace is scoped: source files are copied into the temp directory
/// before execution so backend artifacts never pollute the repository.
pub struct OpenModelicaDockerRunner {
    /// Script path relative to the source root.
    pub script_path: Option<String>,
}

impl Runner for OpenModelicaDockerRunner {
    fn name(&self) -> &'static str {
        "openmodelica_docker"
    }

    fn run(&self, workspace: &Path) -> RunnerReport {
        let env = EnvOverrides::capture();
        let image = env.om_image.unwrap_or_else(|| DEFAULT_OM_DOCKER_IMAGE.to_string());
        let script = self
            .script_path
            .clone()
            .or(env.om_script)
            .unwrap_or_else(|| DEFAULT_OM_SCRIPT.to_string());

        if !workspace.join(&script).exists() {
            return RunnerReport {
                status: RunOutcome::Failure,
                failure_type: FailureType::ConfigError,
                events: 0,
                log_excerpt: format!("missing script: {script}"),
                model_script: Some(script),
                exit_code: -1,
                check_ok: false,
                simulate_ok: false,
                docker_image: Some(image),
            };
        }

        let mut cmd = Command::new("docker");
        cmd.arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(format!("{}:/workspace", workspace.display()))
            .arg("-w")
            .arg("/workspace")
            .arg(&image)
            .arg("omc")
            .arg(&script);

        match run_with_timeout(cmd, DOCKER_RUN_TIMEOUT) {
            Err(mut timeout_report) => {
                timeout_report.model_script = Some(script);
                timeout_report.docker_image = Some(image);
                timeout_report
            }
            Ok(capture) => {
                let merged = format!("{}\n{}", capture.stdout, capture.stderr);
                let (check_ok, simulate_ok) = extract_om_success_flags(&merged);
                let classified = classify_om_failure(&merged, check_ok, simulate_ok);
                if capture.exit_code != 0 || classified != FailureType::None {
                    return RunnerReport {
                        status: RunOutcome::Failure,
                        failure_type: classified,
                        events: 0,
                        log_excerpt: format!(
                            "[{image}] {}",
                            excerpt(&capture.stderr_or_stdout())
                        ),
                        model_script: Some(script),
                        exit_code: capture.exit_code,
                        check_ok,
                        simulate_ok,
                        docker_image: Some(image),
                    };
                }
                RunnerReport {
                    status: RunOutcome::Success,
                    failure_type: FailureType::None,
                    events: u64::from(simulate_ok),
                    log_excerpt: format!("[{image}] {}", excerpt(&capture.stdout)),
                    model_script: Some(script),
                    exit_code: capture.exit_code,
                    check_ok,
                    simulate_ok,
                    docker_image: Some(image),
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Child Process Handling
// ============================================================================

struct Capture {
    stdout: String,
    stderr: String,
    exit_code: i64,
}

impl Capture {
    fn stderr_or_stdout(&self) -> String {
        if self.stderr.trim().is_empty() { self.stdout.clone() } else { self.stderr.clone() }
    }
}

/// Spawns the command and waits for it with a wall-clock deadline.
///
/// A missing binary maps to `tool_missing`; exceeding the deadline kills the
/// child and maps to `timeout`.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Capture, RunnerReport> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).stdin(Stdio::null());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(_) => {
            return Err(RunnerReport {
                status: RunOutcome::Failure,
                failure_type: FailureType::ToolMissing,
                events: 0,
                log_excerpt: "backend binary not found".to_string(),
                model_script: None,
                exit_code: -1,
                check_ok: false,
                simulate_ok: false,
                docker_image: None,
            });
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let (stdout, stderr) = drain(&mut child);
                return Ok(Capture {
                    stdout,
                    stderr,
                    exit_code: i64::from(status.code().unwrap_or(-1)),
                });
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunnerReport {
                        status: RunOutcome::Failure,
                        failure_type: FailureType::Timeout,
                        events: 0,
                        log_excerpt: format!(
                            "backend exceeded wall-clock timeout of {}s",
                            timeout.as_secs()
                        ),
                        model_script: None,
                        exit_code: -1,
                        check_ok: false,
                        simulate_ok: false,
                        docker_image: None,
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(_) => {
                let _ = child.kill();
                return Err(RunnerReport {
                    status: RunOutcome::Failure,
                    failure_type: FailureType::DockerError,
                    events: 0,
                    log_excerpt: "failed to poll backend child".to_string(),
                    model_script: None,
                    exit_code: -1,
                    check_ok: false,
                    simulate_ok: false,
                    docker_image: None,
                });
            }
        }
    }
}

fn drain(child: &mut Child) -> (String, String) {
    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        let _ = pipe.read_to_string(&mut stdout);
    }
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }
    (stdout, stderr)
}

fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.chars().take(LOG_EXCERPT_LIMIT).collect()
}

// ============================================================================
// SECTION: Log Classification
// ============================================================================

/// Extracts check/simulate success flags from raw OMC output.
fn extract_om_success_flags(output: &str) -> (bool, bool) {
    let lower = output.to_ascii_lowercase();
    let check_ok = lower.contains("check of") && lower.contains("completed successfully");
    let has_sim_result = lower.contains("record simulationresult");
    let result_file_empty = lower.contains("resultfile = \"\"");
    let sim_error = lower.contains("simulation execution failed")
        || lower.contains("error occurred while solving")
        || lower.contains("division by zero")
        || lower.contains("assertion")
        || lower.contains("integrator failed");
    let simulate_ok = has_sim_result && !result_file_empty && !sim_error;
    (check_ok, simulate_ok)
}

/// Conservative failure classification from OMC log patterns.
fn classify_om_failure(output: &str, check_ok: bool, simulate_ok: bool) -> FailureType {
    let lower = output.to_ascii_lowercase();
    if lower.contains("permission denied while trying to connect to the docker api")
        || lower.contains("cannot connect to the docker daemon")
        || (lower.contains("docker daemon") && lower.contains("not running"))
    {
        return FailureType::DockerError;
    }
    if lower.contains("no viable alternative near token")
        || lower.contains("syntax error")
        || lower.contains("missing token")
    {
        return FailureType::ScriptParseError;
    }
    if lower.contains("undeclared variable") || om_check_failed(&lower) {
        return FailureType::ModelCheckError;
    }
    if lower.contains("simulation execution failed")
        || lower.contains("error occurred while solving")
        || lower.contains("division by zero")
        || lower.contains("assertion")
    {
        return FailureType::SimulateError;
    }
    if !check_ok {
        return FailureType::ModelCheckError;
    }
    if !simulate_ok {
        return FailureType::SimulateError;
    }
    if lower.contains("error:") {
        return FailureType::DockerError;
    }
    FailureType::None
}

fn om_check_failed(lower: &str) -> bool {
    lower
        .find("check of ")
        .is_some_and(|idx| lower[idx..].lines().next().is_some_and(|l| l.contains("failed")))
}

// ============================================================================
// SECTION: Smoke Pipeline
// ============================================================================

/// Parameters for one smoke execution.
pub struct SmokeParams<'a> {
    /// Backend name.
    pub backend: &'a str,
    /// Evidence output path.
    pub out_path: &'a Path,
    /// Optional markdown report path.
    pub report_path: Option<&'a Path>,
    /// Optional model script path.
    pub script_path: Option<&'a str>,
    /// Optional proposal id stamped onto the evidence.
    pub proposal_id: Option<&'a str>,
    /// Optional source root copied into the scoped workspace.
    pub source_root: Option<&'a Path>,
    /// Policy profile recorded in the toolchain block.
    pub policy_profile: Option<&'a str>,
    /// Policy version recorded in the toolchain block.
    pub policy_version: Option<&'a str>,
}

/// Executes one backend run and emits validated evidence.
///
/// # Errors
///
/// Returns [`PipelineError`] when the backend is unsupported, the evidence
/// violates its invariants, or the artifact cannot be written.
pub fn run_smoke(params: &SmokeParams<'_>) -> Result<Evidence, PipelineError> {
    let runner = runner_for(params.backend, params.script_path)?;

    let workspace = TempDir::with_prefix("gateforge-run-")
        .map_err(|err| PipelineError::Input(format!("workspace allocation failed: {err}")))?;
    if let Some(source_root) = params.source_root {
        copy_tree(source_root, workspace.path())?;
    }

    let started = Instant::now();
    tracing::info!(backend = params.backend, "backend run starting");
    let report = runner.run(workspace.path());
    let duration = started.elapsed().as_secs_f64();
    tracing::info!(
        backend = params.backend,
        status = ?report.status,
        failure_type = %report.failure_type,
        "backend run finished"
    );

    let evidence = Evidence {
        schema_version: "0.1.0".to_string(),
        run_id: format!("run-{}", Uuid::new_v4()),
        timestamp_utc: Utc::now().to_rfc3339(),
        backend: params.backend.to_string(),
        model_script: report
            .model_script
            .clone()
            .or_else(|| params.script_path.map(str::to_string)),
        status: report.status,
        failure_type: report.failure_type,
        gate: derive_gate(&report),
        check_ok: report.check_ok,
        simulate_ok: report.simulate_ok,
        metrics: Metrics {
            runtime_seconds: round4(duration),
            events: report.events,
            ..Metrics::default()
        },
        exit_code: report.exit_code,
        toolchain: Toolchain {
            backend_version: None,
            docker_image: report.docker_image.clone(),
            policy_profile: params.policy_profile.map(str::to_string),
            policy_version: params.policy_version.map(str::to_string),
        },
        artifacts: EvidenceArtifacts {
            log_excerpt: Some(report.log_excerpt.clone()),
        },
        proposal_id: params.proposal_id.map(str::to_string),
    };
    evidence.validate()?;

    write_json_atomic(params.out_path, &evidence)?;
    let report_path = params
        .report_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_md_path(params.out_path));
    write_text(&report_path, &report::evidence_markdown(&evidence))?;
    Ok(evidence)
}

const fn derive_gate(report: &RunnerReport) -> Gate {
    Evidence::derive_gate(report.status, report.check_ok, report.simulate_ok)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Sibling `.md` path for a `.json` artifact.
#[must_use]
pub fn default_md_path(out_path: &Path) -> PathBuf {
    if out_path.extension().is_some_and(|e| e == "json") {
        out_path.with_extension("md")
    } else {
        PathBuf::from(format!("{}.md", out_path.display()))
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), PipelineError> {
    for entry in std::fs::read_dir(src)
        .map_err(|err| PipelineError::Input(format!("source root unreadable: {err}")))?
    {
        let entry =
            entry.map_err(|err| PipelineError::Input(format!("source root entry: {err}")))?;
        let target = dst.join(entry.file_name());
        let kind = entry
            .file_type()
            .map_err(|err| PipelineError::Input(format!("source root entry type: {err}")))?;
        if kind.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|err| PipelineError::Input(format!("workspace mkdir: {err}")))?;
            copy_tree(&entry.path(), &target)?;
        } else if kind.is_file() {
            std::fs::copy(entry.path(), &target)
                .map_err(|err| PipelineError::Input(format!("workspace copy: {err}")))?;
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
