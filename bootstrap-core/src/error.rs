use thiserror::Error;
use sqlx::Error as SqlxError;
use std::io::{Error as IoError, Write};

use crate::migrations::MigrationError;
use crate::restore::RestoreError;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Schema state query failed: {0}")]
    Query(#[from] SqlxError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error("Handoff to {program} failed: {source}")]
    Handoff {
        program: String,
        #[source]
        source: IoError,
    },

    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Wait for database cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl BootstrapError {
    /// Process exit code reported to the container supervisor.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::InvalidConfig(_) => 2,
            BootstrapError::Query(_) => 1,
            BootstrapError::Migration(e) => e.exit_code(),
            BootstrapError::Restore(e) => e.exit_code(),
            BootstrapError::Handoff { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => 127,
                std::io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            BootstrapError::Io(_) => 1,
            BootstrapError::Cancelled { .. } => 1,
        }
    }

    /// Tool output the orchestrator reproduces on stdout before exiting.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            BootstrapError::Restore(RestoreError::Errors { content, .. }) => Some(content),
            _ => None,
        }
    }
}

/// Writes any captured tool output to `out` and returns the process exit code.
///
/// Errors that are not a `BootstrapError` (argument or runtime setup) exit 1.
pub fn report_failure<W: Write>(err: &anyhow::Error, out: &mut W) -> i32 {
    let Some(bootstrap_err) = err.downcast_ref::<BootstrapError>() else {
        return 1;
    };
    if let Some(content) = bootstrap_err.captured_output() {
        if let Err(e) = writeln!(out, "{}", content).and_then(|_| out.flush()) {
            tracing::debug!(error = %e, "failed to write captured restore errors");
        }
    }
    bootstrap_err.exit_code()
}

/// Maps a child exit status code to a nonzero orchestrator exit code.
pub(crate) fn failure_code(code: Option<i32>) -> i32 {
    match code {
        Some(code) if code != 0 => code,
        _ => 1,
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;
