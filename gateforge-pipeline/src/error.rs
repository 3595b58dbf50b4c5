// gateforge-pipeline/src/error.rs
// ============================================================================
// Module: GateForge Pipeline Errors
// Description: Error taxonomy for pipeline commands.
// Purpose: Map every failure to the caller-facing contract.
// Dependencies: gateforge-core, gateforge-config, thiserror
// ============================================================================

//! ## Overview
//! Errors detected before any output is written abort the command (exit 1);
//! errors detected mid-pipeline surface inside the written summary instead.
//! This enum covers the abort paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// SECTION: Pipeline Error
// ============================================================================

/// Errors that abort a pipeline command before output is written.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Artifact I/O or parse failure.
    #[error(transparent)]
    Artifact(#[from] gateforge_core::ArtifactError),
    /// Configuration resolution failure.
    #[error(transparent)]
    Config(#[from] gateforge_config::ConfigError),
    /// Proposal validation failure.
    #[error(transparent)]
    Proposal(#[from] gateforge_core::ProposalError),
    /// Review decision validation failure.
    #[error(transparent)]
    Review(#[from] gateforge_core::ReviewError),
    /// Checker resolution failure.
    #[error(transparent)]
    Checker(#[from] gateforge_core::CheckerError),
    /// Evidence invariant violation.
    #[error(transparent)]
    Evidence(#[from] gateforge_core::EvidenceError),
    /// Canonical hashing failure.
    #[error(transparent)]
    Hash(#[from] gateforge_core::HashError),
    /// Change-set validation or application failure.
    #[error(transparent)]
    Change(#[from] crate::change::ChangeError),
    /// Planner backend failure.
    #[error(transparent)]
    Planner(#[from] crate::planner::PlannerError),
    /// No baseline mapping for the requested target.
    #[error(
        "baseline_not_found: no baseline mapping for backend={backend}, \
         model_script={model_script} in {index:?}"
    )]
    BaselineNotFound {
        /// Requested backend.
        backend: String,
        /// Requested model script.
        model_script: String,
        /// Index file consulted.
        index: PathBuf,
    },
    /// Malformed or missing required input.
    #[error("invalid input: {0}")]
    Input(String),
}
