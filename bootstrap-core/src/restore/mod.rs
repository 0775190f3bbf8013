/// Reference-data restore: gating, policy evaluation and the tool seam

pub mod runner;

pub use runner::CommandRestorer;

use crate::config::RestorePolicy;
use crate::error::failure_code;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Restore tool {program} could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Restore log {path} unavailable: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Restore failed ({status}){}", stderr_suffix(.stderr))]
    Failed {
        code: Option<i32>,
        status: String,
        stderr: String,
    },

    #[error("Restore reported errors (see {}):\n{content}", .error_log.display())]
    Errors { error_log: PathBuf, content: String },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", trimmed)
    }
}

impl RestoreError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RestoreError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => 127,
            RestoreError::Spawn { .. } | RestoreError::Log { .. } => 1,
            RestoreError::Failed { code, .. } => failure_code(*code),
            RestoreError::Errors { .. } => 1,
        }
    }
}

/// One restore invocation, as handed to a [`Restorer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub database_url: String,
    pub dump_path: PathBuf,
    pub jobs: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub log_output: String,
    pub error_output: String,
    pub succeeded: bool,
    pub exit_code: Option<i32>,
}

/// Data-only, trigger-disabled, parallel load of a dump into an existing schema.
#[async_trait]
pub trait Restorer: Send + Sync {
    async fn restore(&self, request: &RestoreRequest) -> Result<RestoreOutcome, RestoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreDecision {
    Run,
    SkipAlreadyInitialized,
    SkipDisabled,
    SkipMissingDump,
}

impl RestoreDecision {
    /// Restore runs only right after a fresh migration, when enabled and the dump is present.
    pub fn decide(migrated: bool, enabled: bool, dump_path: &Path) -> Self {
        if !migrated {
            RestoreDecision::SkipAlreadyInitialized
        } else if !enabled {
            RestoreDecision::SkipDisabled
        } else if !dump_path.is_file() {
            RestoreDecision::SkipMissingDump
        } else {
            RestoreDecision::Run
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreDecision::Run => "run",
            RestoreDecision::SkipAlreadyInitialized => "skip_already_initialized",
            RestoreDecision::SkipDisabled => "skip_disabled",
            RestoreDecision::SkipMissingDump => "skip_missing_dump",
        }
    }
}

/// Error-stream lines that are neither blank nor matched by a benign pattern.
pub fn significant_errors(error_output: &str, benign_patterns: &[String]) -> String {
    error_output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !benign_patterns.iter().any(|p| !p.is_empty() && line.contains(p.as_str())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Applies the configured policy to a finished restore.
pub fn evaluate(
    policy: RestorePolicy,
    outcome: &RestoreOutcome,
    benign_patterns: &[String],
    error_log: &Path,
) -> Result<(), RestoreError> {
    match policy {
        RestorePolicy::Strict => {
            if outcome.succeeded {
                Ok(())
            } else {
                Err(RestoreError::Failed {
                    code: outcome.exit_code,
                    status: match outcome.exit_code {
                        Some(code) => format!("exit status: {}", code),
                        None => "terminated by signal".to_string(),
                    },
                    stderr: outcome.error_output.clone(),
                })
            }
        }
        RestorePolicy::Lenient => {
            let content = significant_errors(&outcome.error_output, benign_patterns);
            if content.is_empty() {
                Ok(())
            } else {
                Err(RestoreError::Errors {
                    error_log: error_log.to_path_buf(),
                    content,
                })
            }
        }
    }
}
