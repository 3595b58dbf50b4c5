// gateforge-core/src/io.rs
// ============================================================================
// Module: GateForge Artifact I/O
// Description: Atomic JSON artifact writes and append-only JSONL ledgers.
// Purpose: Guarantee no partial artifact or torn ledger line is observable.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every JSON artifact is written to a temporary file in the destination
//! directory and atomically renamed into place, so readers never observe a
//! partial document. Ledgers are append-only JSONL files: each append is a
//! single newline-terminated `write_all` on an append-mode handle, serialized
//! through a mutex, so concurrent appenders never tear a line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by artifact I/O.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem operation failed.
    #[error("io error on {path:?}: {source}")]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// JSON (de)serialization failed.
    #[error("json error on {path:?}: {source}")]
    Json {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Artifact violated its schema.
    #[error("schema violation in {path:?}: {message}")]
    Schema {
        /// Path involved in the failure.
        path: PathBuf,
        /// Violation description.
        message: String,
    },
    /// Ledger mutex was poisoned by a panicking writer.
    #[error("ledger lock poisoned for {path:?}")]
    LockPoisoned {
        /// Ledger path.
        path: PathBuf,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ============================================================================
// SECTION: JSON Artifacts
// ============================================================================

/// Reads and deserializes a JSON artifact.
///
/// # Errors
///
/// Returns [`ArtifactError`] on I/O or parse failure.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let raw = fs::read_to_string(path).map_err(|err| ArtifactError::io(path, err))?;
    serde_json::from_str(&raw).map_err(|err| ArtifactError::json(path, err))
}

/// Serializes and atomically writes a JSON artifact.
///
/// The payload lands at `path` via a temporary sibling file and an atomic
/// rename; a crashed writer leaves no partial artifact behind at `path`.
///
/// # Errors
///
/// Returns [`ArtifactError`] on I/O or serialization failure.
pub fn write_json_atomic<T: Serialize>(path: &Path, payload: &T) -> Result<(), ArtifactError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| ArtifactError::io(parent, err))?;

    let body = serde_json::to_vec_pretty(payload).map_err(|err| ArtifactError::json(path, err))?;

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
    let tmp_path = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));
    {
        let mut tmp = File::create(&tmp_path).map_err(|err| ArtifactError::io(&tmp_path, err))?;
        tmp.write_all(&body).map_err(|err| ArtifactError::io(&tmp_path, err))?;
        tmp.write_all(b"\n").map_err(|err| ArtifactError::io(&tmp_path, err))?;
        tmp.sync_all().map_err(|err| ArtifactError::io(&tmp_path, err))?;
    }
    fs::rename(&tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        ArtifactError::io(path, err)
    })
}

/// Writes a plain text artifact (markdown reports) with directory creation.
///
/// # Errors
///
/// Returns [`ArtifactError`] on I/O failure.
pub fn write_text(path: &Path, body: &str) -> Result<(), ArtifactError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| ArtifactError::io(parent, err))?;
    fs::write(path, body).map_err(|err| ArtifactError::io(path, err))
}

// ============================================================================
// SECTION: JSONL Ledgers
// ============================================================================

/// Reads every record of a JSONL ledger, skipping blank lines.
///
/// A missing ledger reads as empty.
///
/// # Errors
///
/// Returns [`ArtifactError`] on I/O failure or when a line fails to parse.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ArtifactError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|err| ArtifactError::io(path, err))?;
    let reader = BufReader::new(file);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|err| ArtifactError::io(path, err))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        rows.push(serde_json::from_str(trimmed).map_err(|err| ArtifactError::json(path, err))?);
    }
    Ok(rows)
}

/// Append-only JSONL ledger handle.
///
/// Each append is one compact, newline-terminated record written with a
/// single `write_all` call on an `O_APPEND` handle.
pub struct JsonlLedger {
    /// Ledger file path.
    path: PathBuf,
    /// Append handle, serialized across in-process writers.
    file: Mutex<File>,
}

impl JsonlLedger {
    /// Opens (creating if needed) a ledger for appending.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, ArtifactError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|err| ArtifactError::io(parent, err))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| ArtifactError::io(path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Appends one record as a single newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] on serialization or write failure.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), ArtifactError> {
        let mut line =
            serde_json::to_vec(record).map_err(|err| ArtifactError::json(&self.path, err))?;
        line.push(b'\n');
        let mut guard = self.file.lock().map_err(|_| ArtifactError::LockPoisoned {
            path: self.path.clone(),
        })?;
        guard.write_all(&line).map_err(|err| ArtifactError::io(&self.path, err))?;
        guard.flush().map_err(|err| ArtifactError::io(&self.path, err))
    }

    /// Returns the ledger path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
