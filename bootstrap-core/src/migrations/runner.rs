/// Runs the configured migration command as a child process

use super::{MigrationError, Migrator};
use crate::command::CommandLine;
use crate::log_step;
use async_trait::async_trait;
use std::process::Stdio;

pub struct CommandMigrator {
    command: CommandLine,
    url_env: String,
}

impl CommandMigrator {
    pub fn new(command: CommandLine, url_env: impl Into<String>) -> Self {
        Self {
            command,
            url_env: url_env.into(),
        }
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }
}

#[async_trait]
impl Migrator for CommandMigrator {
    async fn upgrade_to_head(&self, database_url: &str) -> Result<(), MigrationError> {
        log_step!(info, "migrate", command = %self.command, "applying migrations");

        // Output is inherited so the tool's own diagnostics land in the container log.
        let status = self
            .command
            .tokio()
            .env(&self.url_env, database_url)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| MigrationError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        if !status.success() {
            log_step!(error, "migrate", status = %status, "migration tool failed");
            return Err(MigrationError::Failed {
                program: self.command.program.clone(),
                code: status.code(),
                status: status.to_string(),
            });
        }

        log_step!(info, "migrate", "migrations applied");
        Ok(())
    }
}
