/// Schema migrations delegated to an external tool

pub mod runner;

pub use runner::CommandMigrator;

use crate::error::failure_code;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Migration tool {program} could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration tool {program} failed ({status})")]
    Failed {
        program: String,
        code: Option<i32>,
        status: String,
    },
}

impl MigrationError {
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => 127,
            MigrationError::Spawn { .. } => 1,
            MigrationError::Failed { code, .. } => failure_code(*code),
        }
    }
}

/// Brings the schema to the latest revision. Treated as atomic.
#[async_trait]
pub trait Migrator: Send + Sync {
    async fn upgrade_to_head(&self, database_url: &str) -> Result<(), MigrationError>;
}
