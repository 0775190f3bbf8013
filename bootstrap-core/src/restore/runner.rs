/// Runs the configured restore command with its streams captured to log files

use super::{RestoreError, RestoreOutcome, RestoreRequest, Restorer};
use crate::command::CommandLine;
use crate::log_step;
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

pub struct CommandRestorer {
    command: CommandLine,
    log_path: PathBuf,
    error_log_path: PathBuf,
}

impl CommandRestorer {
    pub fn new(command: CommandLine, log_path: PathBuf, error_log_path: PathBuf) -> Self {
        Self {
            command,
            log_path,
            error_log_path,
        }
    }

    /// Full command line for one request, dump path last.
    pub fn command_for(&self, request: &RestoreRequest) -> CommandLine {
        self.command
            .clone()
            .arg("--data-only")
            .arg("--disable-triggers")
            .arg("--jobs")
            .arg(request.jobs.to_string())
            .arg("--dbname")
            .arg(&request.database_url)
            .arg(&request.dump_path)
    }
}

fn create_log(path: &Path) -> Result<File, RestoreError> {
    let log_err = |source| RestoreError::Log {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(log_err)?;
    }
    File::create(path).map_err(log_err)
}

async fn read_log(path: &Path) -> Result<String, RestoreError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| RestoreError::Log {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl Restorer for CommandRestorer {
    async fn restore(&self, request: &RestoreRequest) -> Result<RestoreOutcome, RestoreError> {
        let stdout = create_log(&self.log_path)?;
        let stderr = create_log(&self.error_log_path)?;

        log_step!(
            info,
            "restore",
            program = %self.command.program,
            dump = %request.dump_path.display(),
            jobs = request.jobs,
            "restoring reference data"
        );

        let status = self
            .command_for(request)
            .tokio()
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .await
            .map_err(|source| RestoreError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        let outcome = RestoreOutcome {
            log_output: read_log(&self.log_path).await?,
            error_output: read_log(&self.error_log_path).await?,
            succeeded: status.success(),
            exit_code: status.code(),
        };

        log_step!(
            info,
            "restore",
            status = %status,
            stdout_bytes = outcome.log_output.len(),
            stderr_bytes = outcome.error_output.len(),
            log = %self.log_path.display(),
            error_log = %self.error_log_path.display(),
            "restore tool finished"
        );
        Ok(outcome)
    }
}
