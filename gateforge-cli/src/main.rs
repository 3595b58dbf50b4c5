// gateforge-cli/src/main.rs
// ============================================================================
// Module: GateForge CLI Entry Point
// Description: Command dispatcher for the governance pipeline tools.
// Purpose: Provide single-shot commands with contract exit codes.
// Dependencies: clap, gateforge-core, gateforge-config, gateforge-pipeline
// ============================================================================

//! ## Overview
//! Every subcommand is a thin wrapper over an in-process pipeline function
//! with identical semantics. Exit codes are contract: 0 for success, 1 for a
//! logical failure (FAIL decision, constraint violation, schema failure,
//! missing input), 2 for usage errors (clap). Each command prints a one-line
//! JSON summary to stdout; full artifacts land on disk.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use gateforge_core::Decision;
use gateforge_core::RunStatus;
use gateforge_core::io::read_json;
use gateforge_core::io::write_json_atomic;
use gateforge_core::regression::DEFAULT_RUNTIME_THRESHOLD;
use gateforge_core::schema::ArtifactKind;
use gateforge_core::schema::validate_artifact;
use gateforge_config::PolicySelection;
use gateforge_config::env::EnvOverrides;
use gateforge_config::load_policy;
use gateforge_pipeline::backend::SmokeParams;
use gateforge_pipeline::backend::run_smoke;
use gateforge_pipeline::batch::BatchOptions;
use gateforge_pipeline::batch::load_pack;
use gateforge_pipeline::batch::run_repair_batch;
use gateforge_pipeline::change::DEFAULT_MAX_CHANGES;
use gateforge_pipeline::change::load_change_set;
use gateforge_pipeline::change::preflight_change_set;
use gateforge_pipeline::governance::GovernanceThresholds;
use gateforge_pipeline::governance::SnapshotInputs;
use gateforge_pipeline::governance::build_snapshot;
use gateforge_pipeline::history::DEFAULT_HISTORY_WINDOW;
use gateforge_pipeline::history::DEFAULT_WORSE_STREAK_THRESHOLD;
use gateforge_pipeline::history::summarize_history;
use gateforge_pipeline::invariant::DEFAULT_INVARIANT_CONFIDENCE_MIN;
use gateforge_pipeline::invariant::InvariantScoreWeights;
use gateforge_pipeline::invariant::build_invariant_repair_plan;
use gateforge_pipeline::invariant::compare_invariant_profiles;
use gateforge_pipeline::planner::GuardrailConfig;
use gateforge_pipeline::planner::PlannerBackend;
use gateforge_pipeline::planner::PlannerRequest;
use gateforge_pipeline::planner::build_proposal_from_intent;
use gateforge_pipeline::planner::evaluate_guardrails;
use gateforge_pipeline::planner::parse_intent;
use gateforge_pipeline::planner::plan_intent;
use gateforge_pipeline::promote::ApplyGuards;
use gateforge_pipeline::promote::apply_promotion;
use gateforge_pipeline::promote::compare_promotion_profiles;
use gateforge_pipeline::promote::promote_snapshot;
use gateforge_pipeline::repair::DEFAULT_MAX_RETRIES;
use gateforge_pipeline::repair::DEFAULT_RETRY_CONFIDENCE_MIN;
use gateforge_pipeline::repair::RepairRequest;
use gateforge_pipeline::repair::run_repair_loop;
use gateforge_pipeline::review::DEFAULT_SLA_SECONDS;
use gateforge_pipeline::review::LedgerFilter;
use gateforge_pipeline::review::export_ledger;
use gateforge_pipeline::review::load_ledger;
use gateforge_pipeline::review::resolve_review_files;
use gateforge_pipeline::review::summarize_ledger;
use gateforge_pipeline::run::RunRequest;
use gateforge_pipeline::run::run_proposal;
use gateforge_pipeline::tasks::build_repair_pack;
use gateforge_pipeline::tasks::build_repair_tasks;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "gateforge", version, about = "Simulation change governance pipeline")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one backend execution and emit evidence.
    Smoke(SmokeCommand),
    /// Run a proposal through the full pipeline.
    Run(RunCommand),
    /// Compare candidate vs baseline evidence.
    Regress(RegressCommand),
    /// Proposal utilities.
    Proposal {
        /// Selected proposal subcommand.
        #[command(subcommand)]
        command: ProposalCommand,
    },
    /// Demo bundle utilities.
    Bundle {
        /// Selected bundle subcommand.
        #[command(subcommand)]
        command: BundleCommand,
    },
    /// Planner utilities.
    Planner {
        /// Selected planner subcommand.
        #[command(subcommand)]
        command: PlannerCommand,
    },
    /// Goal -> planner -> run in one command.
    Autopilot(AutopilotCommand),
    /// Change-set utilities.
    Change {
        /// Selected change subcommand.
        #[command(subcommand)]
        command: ChangeCommand,
    },
    /// Repair workflows.
    Repair {
        /// Selected repair subcommand.
        #[command(subcommand)]
        command: RepairCommand,
    },
    /// Invariant repair workflows.
    Invariant {
        /// Selected invariant subcommand.
        #[command(subcommand)]
        command: InvariantCommand,
    },
    /// Review resolution and ledger.
    Review {
        /// Selected review subcommand.
        #[command(subcommand)]
        command: ReviewCommand,
    },
    /// Governance snapshot, history, and promotion chain.
    Governance {
        /// Selected governance subcommand.
        #[command(subcommand)]
        command: GovernanceCommand,
    },
}

/// Shared policy selection flags.
#[derive(Args, Debug, Clone)]
struct PolicyArgs {
    /// Explicit policy JSON path.
    #[arg(long, value_name = "PATH")]
    policy: Option<PathBuf>,
    /// Named policy profile under policies/.
    #[arg(long, value_name = "NAME")]
    policy_profile: Option<String>,
}

impl PolicyArgs {
    fn selection(&self) -> PolicySelection {
        PolicySelection::new(self.policy.clone(), self.policy_profile.clone())
    }
}

/// Arguments for the smoke command.
#[derive(Args, Debug)]
struct SmokeCommand {
    /// Execution backend.
    #[arg(long, default_value = "mock")]
    backend: String,
    /// Evidence output path.
    #[arg(long, default_value = "artifacts/evidence.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Model script path.
    #[arg(long, value_name = "PATH")]
    script: Option<String>,
}

/// Arguments for the run command.
#[derive(Args, Debug)]
struct RunCommand {
    /// Proposal JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    proposal: PathBuf,
    /// Run summary output path.
    #[arg(long, default_value = "artifacts/proposal_run.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Candidate evidence output path.
    #[arg(long, default_value = "artifacts/candidate_from_proposal.json", value_name = "PATH")]
    candidate_out: PathBuf,
    /// Existing candidate evidence path (regress-only proposals).
    #[arg(long, value_name = "PATH")]
    candidate_in: Option<PathBuf>,
    /// Regression summary output path.
    #[arg(long, default_value = "artifacts/regression_from_proposal.json", value_name = "PATH")]
    regression_out: PathBuf,
    /// Baseline evidence path, or `auto`.
    #[arg(long, default_value = "auto")]
    baseline: String,
    /// Baseline index path for auto resolution.
    #[arg(long, default_value = "baselines/index.json", value_name = "PATH")]
    baseline_index: PathBuf,
    /// Allowed runtime regression ratio (0.2 = +20%).
    #[arg(long, value_name = "RATIO")]
    runtime_threshold: Option<f64>,
    /// Policy selection.
    #[command(flatten)]
    policy: PolicyArgs,
    /// Plan only; skip execution.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

/// Arguments for the regress command.
#[derive(Args, Debug)]
struct RegressCommand {
    /// Baseline evidence path.
    #[arg(long, required = true, value_name = "PATH")]
    baseline: PathBuf,
    /// Candidate evidence path.
    #[arg(long, required = true, value_name = "PATH")]
    candidate: PathBuf,
    /// Optional proposal path; enables strict checks and the policy overlay.
    #[arg(long, value_name = "PATH")]
    proposal: Option<PathBuf>,
    /// Regression output path.
    #[arg(long, default_value = "artifacts/regression.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Allowed runtime regression ratio.
    #[arg(long, value_name = "RATIO")]
    runtime_threshold: Option<f64>,
    /// Enable strict comparability checks.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,
    /// In strict mode, also require model_script to match.
    #[arg(long, action = ArgAction::SetTrue)]
    strict_model_script: bool,
    /// In strict mode, also fail on policy_version mismatch.
    #[arg(long, action = ArgAction::SetTrue)]
    strict_policy_version: bool,
    /// Enable a specific checker (repeatable).
    #[arg(long = "checker", value_name = "NAME")]
    checkers: Option<Vec<String>>,
    /// Checker config JSON path.
    #[arg(long, value_name = "PATH")]
    checker_config: Option<PathBuf>,
    /// Policy selection.
    #[command(flatten)]
    policy: PolicyArgs,
}

/// Proposal subcommands.
#[derive(Subcommand, Debug)]
enum ProposalCommand {
    /// Validate a proposal JSON artifact.
    Validate(ProposalValidateCommand),
}

/// Arguments for proposal validation.
#[derive(Args, Debug)]
struct ProposalValidateCommand {
    /// Proposal JSON path.
    #[arg(long = "in", required = true, value_name = "PATH")]
    input: PathBuf,
    /// Optional validation result output path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

/// Bundle subcommands.
#[derive(Subcommand, Debug)]
enum BundleCommand {
    /// Validate a demo bundle summary JSON artifact.
    Validate(BundleValidateCommand),
}

/// Arguments for bundle summary validation.
#[derive(Args, Debug)]
struct BundleValidateCommand {
    /// Demo bundle summary JSON path.
    #[arg(long = "in", required = true, value_name = "PATH")]
    input: PathBuf,
    /// Optional validation result output path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

/// Planner subcommands.
#[derive(Subcommand, Debug)]
enum PlannerCommand {
    /// Plan an intent from a goal.
    Plan(PlannerPlanCommand),
    /// Validate planner output JSON.
    Validate(PlannerValidateCommand),
}

/// Arguments for planning.
#[derive(Args, Debug)]
struct PlannerPlanCommand {
    /// Natural-language goal.
    #[arg(long)]
    goal: Option<String>,
    /// File containing the goal text.
    #[arg(long, value_name = "PATH")]
    goal_file: Option<PathBuf>,
    /// Context JSON path.
    #[arg(long, value_name = "PATH")]
    context_json: Option<PathBuf>,
    /// Backend preference hint.
    #[arg(long, default_value = "auto")]
    prefer_backend: String,
    /// Planner backend.
    #[arg(long, default_value = "rule")]
    planner_backend: String,
    /// Explicit proposal id.
    #[arg(long)]
    proposal_id: Option<String>,
    /// Intent output path.
    #[arg(long, default_value = "artifacts/agent/intent_request.json", value_name = "PATH")]
    out: PathBuf,
}

/// Arguments for planner-output validation.
#[derive(Args, Debug)]
struct PlannerValidateCommand {
    /// Planner output JSON path.
    #[arg(long = "in", required = true, value_name = "PATH")]
    input: PathBuf,
}

/// Shared planner guardrail flags.
#[derive(Args, Debug, Clone)]
struct GuardrailArgs {
    /// Minimum accepted change-plan confidence.
    #[arg(long, value_name = "FLOAT")]
    change_plan_confidence_min: Option<f64>,
    /// Maximum accepted change-plan confidence.
    #[arg(long, value_name = "FLOAT")]
    change_plan_confidence_max: Option<f64>,
    /// Allowed change-plan directory root (repeatable).
    #[arg(long = "change-plan-allowed-root", value_name = "DIR")]
    allowed_roots: Vec<String>,
    /// Allowed change-plan file suffix (repeatable).
    #[arg(long = "change-plan-allowed-suffix", value_name = "SUFFIX")]
    allowed_suffixes: Vec<String>,
    /// Allowed change-plan exact file (repeatable).
    #[arg(long = "change-plan-allowed-file", value_name = "PATH")]
    allowed_files: Vec<String>,
}

impl GuardrailArgs {
    fn config(&self) -> GuardrailConfig {
        GuardrailConfig {
            change_plan_confidence_min: self.change_plan_confidence_min,
            change_plan_confidence_max: self.change_plan_confidence_max,
            allowed_roots: self.allowed_roots.clone(),
            allowed_suffixes: self.allowed_suffixes.clone(),
            allowed_files: self.allowed_files.clone(),
        }
    }
}

/// Arguments for the autopilot command.
#[derive(Args, Debug)]
struct AutopilotCommand {
    /// Natural-language goal.
    #[arg(long)]
    goal: Option<String>,
    /// File containing the goal text.
    #[arg(long, value_name = "PATH")]
    goal_file: Option<PathBuf>,
    /// Context JSON path.
    #[arg(long, value_name = "PATH")]
    context_json: Option<PathBuf>,
    /// Backend preference hint.
    #[arg(long, default_value = "auto")]
    prefer_backend: String,
    /// Planner backend.
    #[arg(long, default_value = "rule")]
    planner_backend: String,
    /// Explicit proposal id.
    #[arg(long)]
    proposal_id: Option<String>,
    /// Intent output path.
    #[arg(long, default_value = "artifacts/autopilot/intent.json", value_name = "PATH")]
    intent_out: PathBuf,
    /// Generated proposal output path.
    #[arg(long, default_value = "artifacts/autopilot/proposal.json", value_name = "PATH")]
    proposal_out: PathBuf,
    /// Run summary output path.
    #[arg(long, default_value = "artifacts/autopilot/run_summary.json", value_name = "PATH")]
    run_out: PathBuf,
    /// Candidate evidence output path.
    #[arg(long, default_value = "artifacts/autopilot/candidate.json", value_name = "PATH")]
    candidate_out: PathBuf,
    /// Regression output path.
    #[arg(long, default_value = "artifacts/autopilot/regression.json", value_name = "PATH")]
    regression_out: PathBuf,
    /// Baseline evidence path, or `auto`.
    #[arg(long, default_value = "auto")]
    baseline: String,
    /// Baseline index path.
    #[arg(long, default_value = "baselines/index.json", value_name = "PATH")]
    baseline_index: PathBuf,
    /// Allowed runtime regression ratio.
    #[arg(long, value_name = "RATIO")]
    runtime_threshold: Option<f64>,
    /// Policy selection.
    #[command(flatten)]
    policy: PolicyArgs,
    /// Guardrail configuration.
    #[command(flatten)]
    guardrails: GuardrailArgs,
    /// Plan only; do not execute the run.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

/// Change subcommands.
#[derive(Subcommand, Debug)]
enum ChangeCommand {
    /// Scope-check a change set without applying it.
    Preflight(ChangePreflightCommand),
}

/// Arguments for change preflight.
#[derive(Args, Debug)]
struct ChangePreflightCommand {
    /// Change-set JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    change_set: PathBuf,
    /// Workspace root the changes would apply to.
    #[arg(long, default_value = ".", value_name = "DIR")]
    workspace_root: PathBuf,
    /// Allowed directory root (repeatable).
    #[arg(long = "allowed-root", value_name = "DIR")]
    allowed_roots: Vec<String>,
    /// Maximum number of operations.
    #[arg(long, default_value_t = DEFAULT_MAX_CHANGES)]
    max_changes: usize,
    /// Preflight report output path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

/// Repair subcommands.
#[derive(Subcommand, Debug)]
enum RepairCommand {
    /// Run the fail -> repair -> rerun loop.
    Loop(RepairLoopCommand),
    /// Derive actionable tasks from a failing summary.
    Tasks(RepairTasksCommand),
    /// Build a batch pack from a tasks summary.
    Pack(RepairPackCommand),
    /// Run the repair loop over a pack.
    Batch(RepairBatchCommand),
    /// Tasks -> pack -> batch in one command.
    Orchestrate(RepairOrchestrateCommand),
}

/// Arguments for the repair loop.
#[derive(Args, Debug)]
struct RepairLoopCommand {
    /// Failing run/regression summary path.
    #[arg(long, required = true, value_name = "PATH")]
    source: PathBuf,
    /// Explicit repair goal.
    #[arg(long)]
    goal: Option<String>,
    /// Planner backend.
    #[arg(long, default_value = "rule")]
    planner_backend: String,
    /// Strategy profile.
    #[arg(long, default_value = "default")]
    strategy_profile: String,
    /// Explicit proposal id.
    #[arg(long)]
    proposal_id: Option<String>,
    /// Baseline evidence path, or `auto`.
    #[arg(long, default_value = "auto")]
    baseline: String,
    /// Baseline index path.
    #[arg(long, default_value = "baselines/index.json", value_name = "PATH")]
    baseline_index: PathBuf,
    /// Allowed runtime regression ratio.
    #[arg(long, value_name = "RATIO")]
    runtime_threshold: Option<f64>,
    /// Policy selection.
    #[command(flatten)]
    policy: PolicyArgs,
    /// Retry budget beyond the first attempt.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
    /// Disable retry after a failed attempt.
    #[arg(long, action = ArgAction::SetTrue)]
    no_retry_on_failed_attempt: bool,
    /// Confidence floor for the conservative retry profile.
    #[arg(long, default_value_t = DEFAULT_RETRY_CONFIDENCE_MIN)]
    retry_confidence_min: f64,
    /// Reason prefix the safety guard blocks.
    #[arg(long, value_name = "PREFIX")]
    block_new_reason_prefix: Option<String>,
    /// Reason the safety guard treats as critical (repeatable).
    #[arg(long = "new-critical-reason", value_name = "REASON")]
    new_critical_reasons: Vec<String>,
    /// Invariant-repair profile name.
    #[arg(long, value_name = "NAME")]
    invariant_repair_profile: Option<String>,
    /// Summary output path.
    #[arg(long, default_value = "artifacts/repair_loop/repair_loop_summary.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Arguments for repair tasks.
#[derive(Args, Debug)]
struct RepairTasksCommand {
    /// Failing run/regression summary path.
    #[arg(long, required = true, value_name = "PATH")]
    source: PathBuf,
    /// Policy selection.
    #[command(flatten)]
    policy: PolicyArgs,
    /// Tasks summary output path.
    #[arg(long, default_value = "artifacts/repair_tasks/summary.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Arguments for pack generation.
#[derive(Args, Debug)]
struct RepairPackCommand {
    /// Tasks summary JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    tasks_summary: PathBuf,
    /// Generated pack id.
    #[arg(long, default_value = "repair_pack_from_tasks")]
    pack_id: String,
    /// Planner backend for generated cases.
    #[arg(long, default_value = "rule")]
    planner_backend: String,
    /// Policy profile for generated cases.
    #[arg(long, value_name = "NAME")]
    policy_profile: Option<String>,
    /// Maximum fix-plan tasks to convert.
    #[arg(long, default_value_t = 5)]
    max_cases: usize,
    /// Pack output path.
    #[arg(long, default_value = "artifacts/repair_pack/pack_from_tasks.json", value_name = "PATH")]
    out: PathBuf,
}

/// Arguments for the repair batch.
#[derive(Args, Debug)]
struct RepairBatchCommand {
    /// Pack JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    pack: PathBuf,
    /// Per-case output directory.
    #[arg(long, default_value = "artifacts/repair_batch", value_name = "DIR")]
    out_dir: PathBuf,
    /// Batch summary output path.
    #[arg(long, default_value = "artifacts/repair_batch/summary.json", value_name = "PATH")]
    summary_out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report_out: Option<PathBuf>,
    /// Default planner backend.
    #[arg(long, default_value = "rule")]
    planner_backend: String,
    /// Default baseline argument.
    #[arg(long, default_value = "auto")]
    baseline: String,
    /// Baseline index path.
    #[arg(long, default_value = "baselines/index.json", value_name = "PATH")]
    baseline_index: PathBuf,
    /// Allowed runtime regression ratio.
    #[arg(long, value_name = "RATIO")]
    runtime_threshold: Option<f64>,
    /// Policy selection.
    #[command(flatten)]
    policy: PolicyArgs,
    /// Compare the pack under two policy profiles.
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
    compare_policy_profiles: Option<Vec<String>>,
    /// Default retry budget.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
    /// Confidence floor for retries.
    #[arg(long, default_value_t = DEFAULT_RETRY_CONFIDENCE_MIN)]
    retry_confidence_min: f64,
    /// Keep running after a failing case (default).
    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_continue_on_fail")]
    continue_on_fail: bool,
    /// Stop at the first failing case.
    #[arg(long, action = ArgAction::SetTrue, overrides_with = "continue_on_fail")]
    no_continue_on_fail: bool,
    /// Worker pool size (1 = fully serial).
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// Reason prefix the safety guard blocks.
    #[arg(long, value_name = "PREFIX")]
    block_new_reason_prefix: Option<String>,
}

/// Arguments for repair orchestration.
#[derive(Args, Debug)]
struct RepairOrchestrateCommand {
    /// Failing run/regression summary path.
    #[arg(long, required = true, value_name = "PATH")]
    source: PathBuf,
    /// Output directory.
    #[arg(long, default_value = "artifacts/repair_orchestrate", value_name = "DIR")]
    out_dir: PathBuf,
    /// Planner backend.
    #[arg(long, default_value = "rule")]
    planner_backend: String,
    /// Policy selection.
    #[command(flatten)]
    policy: PolicyArgs,
    /// Baseline argument for the batch.
    #[arg(long, default_value = "auto")]
    baseline: String,
    /// Baseline index path.
    #[arg(long, default_value = "baselines/index.json", value_name = "PATH")]
    baseline_index: PathBuf,
    /// Maximum fix-plan tasks to convert.
    #[arg(long, default_value_t = 5)]
    max_cases: usize,
    /// Generated pack id.
    #[arg(long, default_value = "repair_orchestrate_pack")]
    pack_id: String,
    /// Summary output path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

/// Invariant subcommands.
#[derive(Subcommand, Debug)]
enum InvariantCommand {
    /// Build an invariant-repair plan from a failing summary.
    Repair(InvariantRepairCommand),
    /// Compare invariant-repair profiles on the same source.
    Compare(InvariantCompareCommand),
}

/// Arguments for invariant repair planning.
#[derive(Args, Debug)]
struct InvariantRepairCommand {
    /// Failing run/regression summary path.
    #[arg(long, required = true, value_name = "PATH")]
    source: PathBuf,
    /// Allowed file whitelist (repeatable).
    #[arg(long = "allowed-file", value_name = "PATH")]
    allowed_files: Vec<String>,
    /// Confidence floor for the plan.
    #[arg(long, default_value_t = DEFAULT_INVARIANT_CONFIDENCE_MIN)]
    confidence_min: f64,
    /// Plan output path.
    #[arg(long, default_value = "artifacts/invariant_repair/plan.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Arguments for invariant profile comparison.
#[derive(Args, Debug)]
struct InvariantCompareCommand {
    /// Failing run/regression summary path.
    #[arg(long, required = true, value_name = "PATH")]
    source: PathBuf,
    /// Profiles to compare.
    #[arg(long, num_args = 1.., default_values_t = ["default".to_string(), "industrial_strict".to_string()])]
    profiles: Vec<String>,
    /// Planner backend.
    #[arg(long, default_value = "rule")]
    planner_backend: String,
    /// Baseline argument.
    #[arg(long, default_value = "auto")]
    baseline: String,
    /// Baseline index path.
    #[arg(long, default_value = "baselines/index.json", value_name = "PATH")]
    baseline_index: PathBuf,
    /// Allowed runtime regression ratio.
    #[arg(long, value_name = "RATIO")]
    runtime_threshold: Option<f64>,
    /// Policy selection.
    #[command(flatten)]
    policy: PolicyArgs,
    /// Output directory for per-profile artifacts.
    #[arg(long, default_value = "artifacts/invariant_repair_compare", value_name = "DIR")]
    out_dir: PathBuf,
    /// Summary output path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Review subcommands.
#[derive(Subcommand, Debug)]
enum ReviewCommand {
    /// Resolve a NEEDS_REVIEW summary with a human decision.
    Resolve(ReviewResolveCommand),
    /// Query, export, and summarize the review ledger.
    Ledger(ReviewLedgerCommand),
}

/// Arguments for review resolution.
#[derive(Args, Debug)]
struct ReviewResolveCommand {
    /// Run summary JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    summary: PathBuf,
    /// Review decision JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    review: PathBuf,
    /// Resolution output path.
    #[arg(long, default_value = "artifacts/review/final_summary.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Review ledger JSONL path.
    #[arg(long, default_value = "artifacts/review/ledger.jsonl", value_name = "PATH")]
    ledger: PathBuf,
}

/// Arguments for ledger queries.
#[derive(Args, Debug)]
struct ReviewLedgerCommand {
    /// Review ledger JSONL path.
    #[arg(long, default_value = "artifacts/review/ledger.jsonl", value_name = "PATH")]
    ledger: PathBuf,
    /// Summary output path.
    #[arg(long, default_value = "artifacts/review/ledger_summary.json", value_name = "PATH")]
    summary_out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report_out: Option<PathBuf>,
    /// Keep records with this final status.
    #[arg(long, value_name = "STATUS")]
    final_status: Option<String>,
    /// Keep records for this proposal.
    #[arg(long, value_name = "ID")]
    proposal_id: Option<String>,
    /// Keep records at or after this UTC instant (ISO-8601).
    #[arg(long, value_name = "TIMESTAMP")]
    since_utc: Option<String>,
    /// Export matching records to this JSONL path.
    #[arg(long, value_name = "PATH")]
    export_out: Option<PathBuf>,
    /// SLA used for breach accounting, in seconds.
    #[arg(long, default_value_t = DEFAULT_SLA_SECONDS)]
    sla_seconds: f64,
}

/// Governance subcommands.
#[derive(Subcommand, Debug)]
enum GovernanceCommand {
    /// Build a governance snapshot from component summaries.
    Report(GovernanceReportCommand),
    /// Record snapshots and summarize the recent trend window.
    History(GovernanceHistoryCommand),
    /// Decide promotion readiness for a snapshot.
    Promote(GovernancePromoteCommand),
    /// Compare promotion profiles on a snapshot.
    PromoteCompare(GovernancePromoteCompareCommand),
    /// Apply a promotion compare decision.
    PromoteApply(GovernancePromoteApplyCommand),
}

/// Arguments for snapshot aggregation.
#[derive(Args, Debug)]
struct GovernanceReportCommand {
    /// Repair batch summary path.
    #[arg(long, value_name = "PATH")]
    repair_batch_summary: Option<PathBuf>,
    /// Review ledger summary path.
    #[arg(long, value_name = "PATH")]
    review_ledger_summary: Option<PathBuf>,
    /// CI matrix summary path.
    #[arg(long, value_name = "PATH")]
    ci_matrix_summary: Option<PathBuf>,
    /// Invariant-repair compare summary path.
    #[arg(long, value_name = "PATH")]
    invariant_repair_summary: Option<PathBuf>,
    /// Previous snapshot path for trend derivation.
    #[arg(long, value_name = "PATH")]
    previous_summary: Option<PathBuf>,
    /// Strict downgrade rate failure threshold.
    #[arg(long, default_value_t = 0.25)]
    max_strict_downgrade_rate: f64,
    /// Review failure rate failure threshold.
    #[arg(long, default_value_t = 0.5)]
    max_fail_rate: f64,
    /// Review recovery rate review threshold.
    #[arg(long, default_value_t = 0.5)]
    min_review_recovery_rate: f64,
    /// Snapshot output path.
    #[arg(long, default_value = "artifacts/governance_snapshot/summary.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Arguments for history recording and windows.
#[derive(Args, Debug)]
struct GovernanceHistoryCommand {
    /// History storage directory.
    #[arg(long, default_value = "artifacts/governance_history", value_name = "DIR")]
    history_dir: PathBuf,
    /// Snapshot JSON to record.
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    /// Label for the record.
    #[arg(long)]
    label: Option<String>,
    /// Trend window size.
    #[arg(long, default_value_t = DEFAULT_HISTORY_WINDOW)]
    last_n: usize,
    /// Worsening-streak alert threshold.
    #[arg(long, default_value_t = DEFAULT_WORSE_STREAK_THRESHOLD)]
    worse_streak_threshold: usize,
    /// Summary output path.
    #[arg(long, default_value = "artifacts/governance_history/summary.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Arguments for the promote stage.
#[derive(Args, Debug)]
struct GovernancePromoteCommand {
    /// Governance snapshot JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    snapshot: PathBuf,
    /// Promotion profile name.
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,
    /// Promotion profile JSON path.
    #[arg(long, value_name = "PATH")]
    profile_path: Option<PathBuf>,
    /// Human override JSON path.
    #[arg(long, value_name = "PATH")]
    r#override: Option<PathBuf>,
    /// Decision output path.
    #[arg(long, default_value = "artifacts/governance_promote/summary.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Arguments for the compare stage.
#[derive(Args, Debug)]
struct GovernancePromoteCompareCommand {
    /// Governance snapshot JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    snapshot: PathBuf,
    /// Profiles to compare.
    #[arg(long, num_args = 1.., default_values_t = ["default".to_string(), "industrial_strict".to_string()])]
    profiles: Vec<String>,
    /// Margin floor echoed onto the summary.
    #[arg(long, value_name = "INT")]
    min_top_score_margin: Option<i64>,
    /// Output directory for per-profile artifacts.
    #[arg(long, default_value = "artifacts/governance_promote_compare", value_name = "DIR")]
    out_dir: PathBuf,
    /// Summary output path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Arguments for the apply stage.
#[derive(Args, Debug)]
struct GovernancePromoteApplyCommand {
    /// Compare summary JSON path.
    #[arg(long, required = true, value_name = "PATH")]
    compare_summary: PathBuf,
    /// Review ticket required for NEEDS_REVIEW outcomes.
    #[arg(long, value_name = "ID")]
    review_ticket_id: Option<String>,
    /// Actor identity for the audit record.
    #[arg(long, default_value = "governance.bot")]
    actor: String,
    /// Require a populated ranking explanation block.
    #[arg(long, action = ArgAction::SetTrue)]
    require_ranking_explanation: bool,
    /// Require the top score margin to reach this floor.
    #[arg(long, value_name = "INT")]
    require_min_top_score_margin: Option<i64>,
    /// Require the explanation quality score to reach this floor.
    #[arg(long, value_name = "PERCENT")]
    require_min_explanation_quality: Option<u32>,
    /// Apply summary output path.
    #[arg(long, default_value = "artifacts/governance_promote_apply/summary.json", value_name = "PATH")]
    out: PathBuf,
    /// Markdown report path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Append-only decision audit log path.
    #[arg(
        long,
        default_value = "artifacts/governance_promote_apply/decision_audit.jsonl",
        value_name = "PATH"
    )]
    audit: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<gateforge_pipeline::PipelineError> for CliError {
    fn from(err: gateforge_pipeline::PipelineError) -> Self {
        Self::new(err.to_string())
    }
}

type CliResult = Result<ExitCode, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> CliResult {
    let root = PathBuf::from(".");
    match cli.command {
        Commands::Smoke(cmd) => command_smoke(&cmd),
        Commands::Run(cmd) => command_run(&root, &cmd),
        Commands::Regress(cmd) => command_regress(&root, &cmd),
        Commands::Proposal {
            command: ProposalCommand::Validate(cmd),
        } => command_proposal_validate(&cmd),
        Commands::Bundle {
            command: BundleCommand::Validate(cmd),
        } => command_bundle_validate(&cmd),
        Commands::Planner {
            command,
        } => match command {
            PlannerCommand::Plan(cmd) => command_planner_plan(&cmd),
            PlannerCommand::Validate(cmd) => command_planner_validate(&cmd),
        },
        Commands::Autopilot(cmd) => command_autopilot(&root, &cmd),
        Commands::Change {
            command: ChangeCommand::Preflight(cmd),
        } => command_change_preflight(&cmd),
        Commands::Repair {
            command,
        } => match command {
            RepairCommand::Loop(cmd) => command_repair_loop(&root, &cmd),
            RepairCommand::Tasks(cmd) => command_repair_tasks(&root, &cmd),
            RepairCommand::Pack(cmd) => command_repair_pack(&cmd),
            RepairCommand::Batch(cmd) => command_repair_batch(&root, &cmd),
            RepairCommand::Orchestrate(cmd) => command_repair_orchestrate(&root, &cmd),
        },
        Commands::Invariant {
            command,
        } => match command {
            InvariantCommand::Repair(cmd) => command_invariant_repair(&cmd),
            InvariantCommand::Compare(cmd) => command_invariant_compare(&root, &cmd),
        },
        Commands::Review {
            command,
        } => match command {
            ReviewCommand::Resolve(cmd) => command_review_resolve(&cmd),
            ReviewCommand::Ledger(cmd) => command_review_ledger(&cmd),
        },
        Commands::Governance {
            command,
        } => match command {
            GovernanceCommand::Report(cmd) => command_governance_report(&cmd),
            GovernanceCommand::History(cmd) => command_governance_history(&cmd),
            GovernanceCommand::Promote(cmd) => command_governance_promote(&root, &cmd),
            GovernanceCommand::PromoteCompare(cmd) => {
                command_governance_promote_compare(&root, &cmd)
            }
            GovernanceCommand::PromoteApply(cmd) => command_governance_promote_apply(&cmd),
        },
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn effective_runtime_threshold(flag: Option<f64>) -> f64 {
    flag.or_else(|| EnvOverrides::capture().runtime_threshold)
        .unwrap_or(DEFAULT_RUNTIME_THRESHOLD)
}

fn parse_backend(raw: &str) -> Result<PlannerBackend, CliError> {
    raw.parse::<PlannerBackend>().map_err(|err| CliError::new(err.to_string()))
}

fn emit(line: Value) {
    println!("{line}");
}

fn exit_for_status(status: RunStatus) -> ExitCode {
    if status == RunStatus::Fail { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn exit_for_decision(decision: Decision) -> ExitCode {
    if decision == Decision::Fail { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn load_goal(goal: Option<&str>, goal_file: Option<&Path>) -> Result<String, CliError> {
    match (goal, goal_file) {
        (Some(goal), None) => Ok(goal.to_string()),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| CliError::new(format!("goal file unreadable: {err}")))?;
            let trimmed = text.trim().to_string();
            if trimmed.is_empty() {
                return Err(CliError::new("goal file must contain non-empty text"));
            }
            Ok(trimmed)
        }
        _ => Err(CliError::new("exactly one of --goal or --goal-file must be provided")),
    }
}

fn load_context(path: Option<&Path>) -> Result<serde_json::Map<String, Value>, CliError> {
    match path {
        Some(path) => {
            let value: Value = read_json(path).map_err(|err| CliError::new(err.to_string()))?;
            value
                .as_object()
                .cloned()
                .ok_or_else(|| CliError::new("context-json must be a JSON object"))
        }
        None => Ok(serde_json::Map::new()),
    }
}

// ============================================================================
// SECTION: Command Handlers
// ============================================================================

fn command_smoke(cmd: &SmokeCommand) -> CliResult {
    let params = SmokeParams {
        backend: &cmd.backend,
        out_path: &cmd.out,
        report_path: cmd.report.as_deref(),
        script_path: cmd.script.as_deref(),
        proposal_id: None,
        source_root: None,
        policy_profile: None,
        policy_version: None,
    };
    let evidence = run_smoke(&params)?;
    emit(json!({"gate": evidence.gate, "status": evidence.status}));
    Ok(ExitCode::SUCCESS)
}

fn command_run(root: &Path, cmd: &RunCommand) -> CliResult {
    let request = RunRequest {
        root,
        proposal_path: &cmd.proposal,
        out_path: &cmd.out,
        report_path: cmd.report.as_deref(),
        candidate_out: &cmd.candidate_out,
        candidate_in: cmd.candidate_in.as_deref(),
        regression_out: &cmd.regression_out,
        baseline: &cmd.baseline,
        baseline_index: &cmd.baseline_index,
        runtime_threshold: effective_runtime_threshold(cmd.runtime_threshold),
        policy: cmd.policy.selection(),
        dry_run: cmd.dry_run,
        guardrail: None,
    };
    let summary = run_proposal(&request)?;
    emit(json!({"proposal_id": summary.proposal_id, "status": summary.status}));
    Ok(exit_for_status(summary.status))
}

fn command_regress(root: &Path, cmd: &RegressCommand) -> CliResult {
    use gateforge_core::Evidence;
    use gateforge_core::Proposal;
    use gateforge_core::RegressionOptions;
    use gateforge_core::compare_evidence;

    let env = EnvOverrides::capture();
    let baseline: Evidence = read_json(&cmd.baseline).map_err(|e| CliError::new(e.to_string()))?;
    let candidate: Evidence =
        read_json(&cmd.candidate).map_err(|e| CliError::new(e.to_string()))?;

    let mut checker_config = serde_json::Map::new();
    if let Some(path) = &cmd.checker_config {
        let value: Value = read_json(path).map_err(|e| CliError::new(e.to_string()))?;
        checker_config = value
            .as_object()
            .cloned()
            .ok_or_else(|| CliError::new("--checker-config must point to a JSON object"))?;
    }

    let mut options = RegressionOptions {
        runtime_threshold: effective_runtime_threshold(cmd.runtime_threshold),
        strict: cmd.strict,
        strict_model_script: cmd.strict_model_script || env.strict_model_script,
        strict_policy_version: cmd.strict_policy_version,
        checkers: cmd.checkers.clone(),
        checker_config,
    };

    let proposal: Option<Proposal> = match &cmd.proposal {
        Some(path) => {
            let raw: Value = read_json(path).map_err(|e| CliError::new(e.to_string()))?;
            validate_artifact(ArtifactKind::Proposal, &raw)
                .map_err(|e| CliError::new(e.to_string()))?;
            let proposal: Proposal =
                serde_json::from_value(raw).map_err(|e| CliError::new(e.to_string()))?;
            proposal.validate().map_err(|e| CliError::new(e.to_string()))?;
            // Proposal-driven comparisons are always strict.
            options.strict = true;
            options.strict_model_script = true;
            if options.checkers.is_none() {
                options.checkers = proposal.checkers.clone();
            }
            if options.checker_config.is_empty() {
                options.checker_config = proposal.checker_config.clone();
            }
            if !proposal.physical_invariants.is_empty() {
                let mut guard = options
                    .checker_config
                    .get("invariant_guard")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                guard.insert("invariants".to_string(), json!(proposal.physical_invariants));
                options
                    .checker_config
                    .insert("invariant_guard".to_string(), Value::Object(guard));
            }
            Some(proposal)
        }
        None => None,
    };

    let mut summary = compare_evidence(&baseline, &candidate, &options)
        .map_err(|e| CliError::new(e.to_string()))?;
    if let Some(proposal) = &proposal {
        summary.apply_proposal_alignment(&baseline, &candidate, proposal);
        let (policy, policy_path) =
            load_policy(&cmd.policy.selection(), root).map_err(|e| CliError::new(e.to_string()))?;
        summary.apply_policy(
            &policy,
            proposal.risk_level,
            Some(&policy_path.display().to_string()),
        );
    }

    write_json_atomic(&cmd.out, &summary).map_err(|e| CliError::new(e.to_string()))?;
    let report_path = cmd
        .report
        .clone()
        .unwrap_or_else(|| gateforge_pipeline::backend::default_md_path(&cmd.out));
    gateforge_core::io::write_text(
        &report_path,
        &gateforge_pipeline::report::regression_markdown(&summary),
    )
    .map_err(|e| CliError::new(e.to_string()))?;

    emit(json!({"decision": summary.decision, "reasons": summary.reasons}));
    Ok(exit_for_decision(summary.decision))
}

fn command_proposal_validate(cmd: &ProposalValidateCommand) -> CliResult {
    let outcome = (|| -> Result<String, String> {
        let raw: Value = read_json(&cmd.input).map_err(|e| e.to_string())?;
        validate_artifact(ArtifactKind::Proposal, &raw).map_err(|e| e.to_string())?;
        let proposal: gateforge_core::Proposal =
            serde_json::from_value(raw).map_err(|e| e.to_string())?;
        proposal.validate().map_err(|e| e.to_string())?;
        Ok(proposal.proposal_id)
    })();

    let (result, code) = match outcome {
        Ok(proposal_id) => (json!({"valid": true, "proposal_id": proposal_id}), ExitCode::SUCCESS),
        Err(error) => (json!({"valid": false, "error": error}), ExitCode::FAILURE),
    };
    if let Some(out) = &cmd.out {
        write_json_atomic(out, &result).map_err(|e| CliError::new(e.to_string()))?;
    }
    emit(result);
    Ok(code)
}

fn command_bundle_validate(cmd: &BundleValidateCommand) -> CliResult {
    let outcome = (|| -> Result<(), String> {
        let raw: Value = read_json(&cmd.input).map_err(|e| e.to_string())?;
        validate_artifact(ArtifactKind::DemoBundleSummary, &raw).map_err(|e| e.to_string())?;
        let summary: gateforge_core::DemoBundleSummary =
            serde_json::from_value(raw).map_err(|e| e.to_string())?;
        summary.validate().map_err(|e| e.to_string())
    })();

    let (result, code) = match outcome {
        Ok(()) => (
            json!({"valid": true, "path": cmd.input.display().to_string()}),
            ExitCode::SUCCESS,
        ),
        Err(error) => (json!({"valid": false, "error": error}), ExitCode::FAILURE),
    };
    if let Some(out) = &cmd.out {
        write_json_atomic(out, &result).map_err(|e| CliError::new(e.to_string()))?;
    }
    emit(result);
    Ok(code)
}

fn command_planner_plan(cmd: &PlannerPlanCommand) -> CliResult {
    let backend = parse_backend(&cmd.planner_backend)?;
    let goal = load_goal(cmd.goal.as_deref(), cmd.goal_file.as_deref())?;
    let context = load_context(cmd.context_json.as_deref())?;
    let request = PlannerRequest {
        goal,
        context,
        prefer_backend: Some(cmd.prefer_backend.clone()),
        proposal_id: cmd.proposal_id.clone(),
    };
    let intent = plan_intent(backend, &request).map_err(|e| CliError::new(e.to_string()))?;
    write_json_atomic(&cmd.out, &intent).map_err(|e| CliError::new(e.to_string()))?;
    emit(json!({"intent": intent.intent, "out": cmd.out.display().to_string()}));
    Ok(ExitCode::SUCCESS)
}

fn command_planner_validate(cmd: &PlannerValidateCommand) -> CliResult {
    let raw: Value = read_json(&cmd.input).map_err(|e| CliError::new(e.to_string()))?;
    match parse_intent(&raw) {
        Ok(_) => {
            emit(json!({"status": "PASS", "path": cmd.input.display().to_string()}));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            emit(json!({"status": "FAIL", "reason": err.to_string()}));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn command_autopilot(root: &Path, cmd: &AutopilotCommand) -> CliResult {
    let backend = parse_backend(&cmd.planner_backend)?;
    let goal = load_goal(cmd.goal.as_deref(), cmd.goal_file.as_deref())?;
    let context = load_context(cmd.context_json.as_deref())?;
    let request = PlannerRequest {
        goal,
        context,
        prefer_backend: Some(cmd.prefer_backend.clone()),
        proposal_id: cmd.proposal_id.clone(),
    };

    let intent = plan_intent(backend, &request).map_err(|e| CliError::new(e.to_string()))?;
    write_json_atomic(&cmd.intent_out, &intent).map_err(|e| CliError::new(e.to_string()))?;

    let guardrail_outcome = evaluate_guardrails(&intent, &cmd.guardrails.config());
    if guardrail_outcome.decision == Decision::Fail {
        let rule_ids: Vec<&str> =
            guardrail_outcome.violations.iter().map(|v| v.rule_id.as_str()).collect();
        emit(json!({"status": "FAIL", "planner_guardrail_rule_ids": rule_ids}));
        return Ok(ExitCode::FAILURE);
    }

    let proposal = build_proposal_from_intent(&intent).map_err(|e| CliError::new(e.to_string()))?;
    write_json_atomic(&cmd.proposal_out, &proposal).map_err(|e| CliError::new(e.to_string()))?;

    let run_request = RunRequest {
        root,
        proposal_path: &cmd.proposal_out,
        out_path: &cmd.run_out,
        report_path: None,
        candidate_out: &cmd.candidate_out,
        candidate_in: None,
        regression_out: &cmd.regression_out,
        baseline: &cmd.baseline,
        baseline_index: &cmd.baseline_index,
        runtime_threshold: effective_runtime_threshold(cmd.runtime_threshold),
        policy: cmd.policy.selection(),
        dry_run: cmd.dry_run,
        guardrail: Some(&guardrail_outcome),
    };
    let summary = run_proposal(&run_request)?;
    emit(json!({
        "status": summary.status,
        "proposal_id": summary.proposal_id,
        "intent": intent.intent,
        "dry_run": cmd.dry_run,
    }));
    Ok(exit_for_status(summary.status))
}

fn command_change_preflight(cmd: &ChangePreflightCommand) -> CliResult {
    let change_set = load_change_set(&cmd.change_set)?;
    let allowed_roots = if cmd.allowed_roots.is_empty() {
        vec!["demos".to_string()]
    } else {
        cmd.allowed_roots.clone()
    };
    let report =
        preflight_change_set(&change_set, &cmd.workspace_root, &allowed_roots, cmd.max_changes);
    if let Some(out) = &cmd.out {
        write_json_atomic(out, &report).map_err(|e| CliError::new(e.to_string()))?;
    }
    emit(json!({"status": report.status, "reasons": report.reasons}));
    Ok(if report.ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn command_repair_loop(root: &Path, cmd: &RepairLoopCommand) -> CliResult {
    let request = RepairRequest {
        root,
        source_path: &cmd.source,
        goal: cmd.goal.clone(),
        planner_backend: parse_backend(&cmd.planner_backend)?,
        strategy_profile: cmd.strategy_profile.clone(),
        proposal_id: cmd.proposal_id.clone(),
        baseline: cmd.baseline.clone(),
        baseline_index: cmd.baseline_index.clone(),
        runtime_threshold: effective_runtime_threshold(cmd.runtime_threshold),
        policy: cmd.policy.selection(),
        max_retries: cmd.max_retries,
        retry_on_failed_attempt: !cmd.no_retry_on_failed_attempt,
        retry_confidence_min: cmd.retry_confidence_min,
        block_new_reason_prefix: cmd.block_new_reason_prefix.clone(),
        new_critical_reasons: cmd.new_critical_reasons.clone(),
        invariant_repair_profile: cmd.invariant_repair_profile.clone(),
        out_path: cmd.out.clone(),
        report_path: cmd.report.clone(),
    };
    let summary = run_repair_loop(&request)?;
    emit(json!({
        "status": summary.status,
        "delta": summary.comparison.delta,
        "safety_guard_triggered": summary.safety_guard_triggered,
    }));
    Ok(exit_for_status(summary.status))
}

fn command_repair_tasks(root: &Path, cmd: &RepairTasksCommand) -> CliResult {
    let summary = build_repair_tasks(
        root,
        &cmd.source,
        &cmd.policy.selection(),
        &cmd.out,
        cmd.report.as_deref(),
    )?;
    emit(json!({"task_count": summary.task_count, "policy_decision": summary.policy_decision}));
    Ok(ExitCode::SUCCESS)
}

fn command_repair_pack(cmd: &RepairPackCommand) -> CliResult {
    let tasks_summary = read_json(&cmd.tasks_summary).map_err(|e| CliError::new(e.to_string()))?;
    let pack = build_repair_pack(
        &tasks_summary,
        &cmd.pack_id,
        &cmd.planner_backend,
        cmd.policy_profile.as_deref(),
        cmd.max_cases,
        &cmd.out,
    )?;
    emit(json!({
        "pack_id": pack.pack_id,
        "case_count": pack.cases.len(),
        "out": cmd.out.display().to_string(),
    }));
    Ok(ExitCode::SUCCESS)
}

fn command_repair_batch(root: &Path, cmd: &RepairBatchCommand) -> CliResult {
    let pack = load_pack(&cmd.pack)?;
    let compare = cmd.compare_policy_profiles.as_ref().and_then(|pair| {
        (pair.len() == 2).then(|| (pair[0].clone(), pair[1].clone()))
    });
    let options = BatchOptions {
        workers: cmd.workers,
        planner_backend: parse_backend(&cmd.planner_backend)?,
        baseline: cmd.baseline.clone(),
        baseline_index: cmd.baseline_index.clone(),
        runtime_threshold: effective_runtime_threshold(cmd.runtime_threshold),
        policy: cmd.policy.selection(),
        max_retries: cmd.max_retries,
        retry_confidence_min: cmd.retry_confidence_min,
        continue_on_fail: cmd.continue_on_fail || !cmd.no_continue_on_fail,
        block_new_reason_prefix: cmd.block_new_reason_prefix.clone(),
        compare_policy_profiles: compare,
    };
    let summary = run_repair_batch(
        root,
        &pack,
        &cmd.out_dir,
        &cmd.summary_out,
        cmd.report_out.as_deref(),
        &options,
    )?;
    emit(json!({
        "pack_id": summary.pack_id,
        "total_cases": summary.counts.total_cases,
        "fail_count": summary.counts.fail_count,
    }));
    let failing = summary.counts.fail_count > 0 || summary.counts.unknown_count > 0;
    Ok(if failing { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn command_repair_orchestrate(root: &Path, cmd: &RepairOrchestrateCommand) -> CliResult {
    let tasks_out = cmd.out_dir.join("tasks.json");
    let pack_out = cmd.out_dir.join("pack.json");
    let batch_out = cmd.out_dir.join("batch_summary.json");
    let summary_out = cmd.out.clone().unwrap_or_else(|| cmd.out_dir.join("summary.json"));

    let tasks = build_repair_tasks(root, &cmd.source, &cmd.policy.selection(), &tasks_out, None)?;
    let pack = build_repair_pack(
        &tasks,
        &cmd.pack_id,
        &cmd.planner_backend,
        cmd.policy.policy_profile.as_deref(),
        cmd.max_cases,
        &pack_out,
    )?;
    let options = BatchOptions {
        planner_backend: parse_backend(&cmd.planner_backend)?,
        baseline: cmd.baseline.clone(),
        baseline_index: cmd.baseline_index.clone(),
        policy: cmd.policy.selection(),
        ..BatchOptions::default()
    };
    let batch = run_repair_batch(root, &pack, &cmd.out_dir, &batch_out, None, &options)?;

    let batch_status = if batch.counts.fail_count > 0 || batch.counts.unknown_count > 0 {
        RunStatus::Fail
    } else if batch.counts.needs_review_count > 0 {
        RunStatus::NeedsReview
    } else {
        RunStatus::Pass
    };
    let summary = json!({
        "status": if batch_status == RunStatus::Fail { "FAIL" } else { "PASS" },
        "batch_status": batch_status,
        "source": cmd.source.display().to_string(),
        "tasks_path": tasks_out.display().to_string(),
        "pack_path": pack_out.display().to_string(),
        "batch_summary_path": batch_out.display().to_string(),
        "task_count": tasks.task_count,
        "case_count": pack.cases.len(),
    });
    write_json_atomic(&summary_out, &summary).map_err(|e| CliError::new(e.to_string()))?;
    emit(json!({"status": summary["status"], "summary": summary_out.display().to_string()}));
    Ok(if batch_status == RunStatus::Fail { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn command_invariant_repair(cmd: &InvariantRepairCommand) -> CliResult {
    let allowed = if cmd.allowed_files.is_empty() { None } else { Some(cmd.allowed_files.as_slice()) };
    let plan = build_invariant_repair_plan(
        &cmd.source,
        allowed,
        cmd.confidence_min,
        &cmd.out,
        cmd.report.as_deref(),
    )?;
    emit(json!({
        "invariant_repair_detected": plan.invariant_repair_detected,
        "invariant_reason_count": plan.invariant_reason_count,
    }));
    Ok(ExitCode::SUCCESS)
}

fn command_invariant_compare(root: &Path, cmd: &InvariantCompareCommand) -> CliResult {
    let out_path = cmd.out.clone().unwrap_or_else(|| cmd.out_dir.join("summary.json"));
    let summary = compare_invariant_profiles(
        root,
        &cmd.source,
        &cmd.profiles,
        parse_backend(&cmd.planner_backend)?,
        &cmd.baseline,
        &cmd.baseline_index,
        effective_runtime_threshold(cmd.runtime_threshold),
        &cmd.policy.selection(),
        &InvariantScoreWeights::default(),
        &cmd.out_dir,
        &out_path,
        cmd.report.as_deref(),
    )?;
    emit(json!({
        "status": summary.status,
        "best_profile": summary.best_profile,
        "best_total_score": summary.best_total_score,
    }));
    Ok(exit_for_status(summary.status))
}

fn command_review_resolve(cmd: &ReviewResolveCommand) -> CliResult {
    let resolution = resolve_review_files(
        &cmd.summary,
        &cmd.review,
        &cmd.out,
        cmd.report.as_deref(),
        &cmd.ledger,
    )?;
    emit(json!({
        "proposal_id": resolution.proposal_id,
        "final_status": resolution.final_status,
    }));
    Ok(exit_for_status(resolution.final_status))
}

fn command_review_ledger(cmd: &ReviewLedgerCommand) -> CliResult {
    let since_utc = match &cmd.since_utc {
        Some(raw) => Some(
            gateforge_core::core::review::parse_utc(raw)
                .ok_or_else(|| CliError::new("--since-utc must be an ISO-8601 UTC timestamp"))?,
        ),
        None => None,
    };
    let filter = LedgerFilter {
        final_status: cmd.final_status.as_deref().map(RunStatus::from_label),
        proposal_id: cmd.proposal_id.clone(),
        since_utc,
    };
    let records = load_ledger(&cmd.ledger, &filter)?;
    if let Some(export_out) = &cmd.export_out {
        export_ledger(&records, export_out)?;
    }
    let summary = summarize_ledger(&records, cmd.sla_seconds, Utc::now());
    write_json_atomic(&cmd.summary_out, &summary).map_err(|e| CliError::new(e.to_string()))?;
    let report_path = cmd
        .report_out
        .clone()
        .unwrap_or_else(|| gateforge_pipeline::backend::default_md_path(&cmd.summary_out));
    gateforge_core::io::write_text(
        &report_path,
        &gateforge_pipeline::report::ledger_markdown(&summary),
    )
    .map_err(|e| CliError::new(e.to_string()))?;
    emit(json!({"total_records": summary.total_records}));
    Ok(ExitCode::SUCCESS)
}

fn command_governance_report(cmd: &GovernanceReportCommand) -> CliResult {
    let inputs = SnapshotInputs {
        repair_batch_summary: cmd.repair_batch_summary.clone(),
        review_ledger_summary: cmd.review_ledger_summary.clone(),
        ci_matrix_summary: cmd.ci_matrix_summary.clone(),
        invariant_repair_summary: cmd.invariant_repair_summary.clone(),
        previous_summary: cmd.previous_summary.clone(),
    };
    let thresholds = GovernanceThresholds {
        max_strict_downgrade_rate: cmd.max_strict_downgrade_rate,
        max_fail_rate: cmd.max_fail_rate,
        min_review_recovery_rate: cmd.min_review_recovery_rate,
        ..GovernanceThresholds::default()
    };
    let snapshot = build_snapshot(&inputs, &thresholds, &cmd.out, cmd.report.as_deref())?;
    emit(json!({"status": snapshot.status, "risks": snapshot.risks}));
    Ok(exit_for_decision(snapshot.status))
}

fn command_governance_history(cmd: &GovernanceHistoryCommand) -> CliResult {
    let summary = summarize_history(
        &cmd.history_dir,
        cmd.snapshot.as_deref(),
        cmd.label.as_deref(),
        cmd.last_n,
        cmd.worse_streak_threshold,
        &cmd.out,
        cmd.report.as_deref(),
    )?;
    emit(json!({
        "total_records": summary.total_records,
        "window_size": summary.window_size,
        "latest_status": summary.latest_status,
        "alerts": summary.alerts,
    }));
    Ok(ExitCode::SUCCESS)
}

fn command_governance_promote(root: &Path, cmd: &GovernancePromoteCommand) -> CliResult {
    let decision = promote_snapshot(
        root,
        &cmd.snapshot,
        cmd.profile.as_deref(),
        cmd.profile_path.as_deref(),
        cmd.r#override.as_deref(),
        &cmd.out,
        cmd.report.as_deref(),
    )?;
    emit(json!({"decision": decision.decision, "reasons": decision.reasons}));
    Ok(exit_for_decision(decision.decision))
}

fn command_governance_promote_compare(
    root: &Path,
    cmd: &GovernancePromoteCompareCommand,
) -> CliResult {
    let out_path = cmd.out.clone().unwrap_or_else(|| cmd.out_dir.join("summary.json"));
    let summary = compare_promotion_profiles(
        root,
        &cmd.snapshot,
        &cmd.profiles,
        cmd.min_top_score_margin,
        &cmd.out_dir,
        &out_path,
        cmd.report.as_deref(),
    )?;
    emit(json!({
        "status": summary.status,
        "best_profile": summary.best_profile,
        "best_decision": summary.best_decision,
        "top_score_margin": summary.top_score_margin,
    }));
    Ok(exit_for_decision(summary.status))
}

fn command_governance_promote_apply(cmd: &GovernancePromoteApplyCommand) -> CliResult {
    let guards = ApplyGuards {
        require_ranking_explanation: cmd.require_ranking_explanation,
        require_min_top_score_margin: cmd.require_min_top_score_margin,
        require_min_explanation_quality: cmd.require_min_explanation_quality,
    };
    let summary = apply_promotion(
        &cmd.compare_summary,
        cmd.review_ticket_id.as_deref(),
        &cmd.actor,
        &guards,
        &cmd.out,
        cmd.report.as_deref(),
        &cmd.audit,
    )?;
    emit(json!({
        "final_status": summary.final_status,
        "apply_action": summary.apply_action,
        "best_profile": summary.best_profile,
    }));
    Ok(exit_for_status(summary.final_status))
}
