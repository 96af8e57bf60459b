/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise Syn-Mirror error types to provide consistent
    diagnostics and exit semantics.

  Security / Safety Notes:
    Error contexts redact credentials; HTTP auth material never
    appears in messages, only hosts, paths and object keys.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules to propagate run-fatal failures and
    consolidate exit codes for the binary entry point.

  Revision History:
    2026-10-18 COD  Established shared error definitions.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::process::ExitCode;

use thiserror::Error;

use crate::apkindex::IndexError;
use crate::fetch::FetchError;

/// Result alias for Syn-Mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Enumerates high-level error domains surfaced by Syn-Mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Network: {0}")]
    Network(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error("Runtime: {0}")]
    Runtime(String),
    #[error("No packages found for {arch} matching {filter}")]
    NoPackagesFound { arch: String, filter: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MirrorError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            MirrorError::Config(_) => ExitCode::from(20),
            MirrorError::Network(_) | MirrorError::Fetch(_) => ExitCode::from(30),
            MirrorError::Serialization(_) | MirrorError::Index(_) => ExitCode::from(31),
            MirrorError::Filesystem(_) => ExitCode::from(40),
            MirrorError::Io(_) => ExitCode::from(41),
            MirrorError::Runtime(_) => ExitCode::from(50),
            MirrorError::NoPackagesFound { .. } => ExitCode::from(60),
        }
    }
}
