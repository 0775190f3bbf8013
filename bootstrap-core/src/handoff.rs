/// Replaces this process with the application server

use crate::command::CommandLine;
use crate::config::{BootstrapConfig, ServerConfig};
use crate::error::{BootstrapError, Result};
use crate::log_step;
use std::io::Write;

/// Fully resolved server launch: command line plus exported environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: CommandLine,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(server: &ServerConfig, url_env: &str, app_url: &str) -> Result<Self> {
        let command = CommandLine::from_parts(&server.command)
            .ok_or_else(|| BootstrapError::InvalidConfig("server.command must name a program".to_string()))?
            .arg("--host")
            .arg(&server.host)
            .arg("--port")
            .arg(server.port.to_string());

        Ok(Self {
            command,
            env: vec![(url_env.to_string(), app_url.to_string())],
        })
    }

    pub fn from_config(config: &BootstrapConfig) -> Result<Self> {
        Self::new(&config.server, &config.database.url_env, &config.database.app_url)
    }
}

pub trait Launcher: Send + Sync {
    /// Does not return on success for real launchers.
    fn launch(&self, spec: &LaunchSpec) -> Result<()>;
}

/// `exec`s the server under this process id so signals reach it directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecLauncher;

impl Launcher for ExecLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        log_step!(info, "handoff", command = %spec.command, "handing off to application server");
        if let Err(e) = std::io::stdout().flush() {
            log_step!(debug, "handoff", error = %e, "failed to flush stdout before exec");
        }
        if let Err(e) = std::io::stderr().flush() {
            log_step!(debug, "handoff", error = %e, "failed to flush stderr before exec");
        }

        let mut command = spec.command.std();
        command.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let source = exec(&mut command);
        Err(BootstrapError::Handoff {
            program: spec.command.program.clone(),
            source,
        })
    }
}

/// Only returns if the process image could not be replaced.
#[cfg(unix)]
fn exec(command: &mut std::process::Command) -> std::io::Error {
    use std::os::unix::process::CommandExt;
    command.exec()
}

#[cfg(not(unix))]
fn exec(command: &mut std::process::Command) -> std::io::Error {
    match command.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(e) => e,
    }
}
