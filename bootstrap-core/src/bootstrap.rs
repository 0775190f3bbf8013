/// Startup sequence: wait for the database, migrate once, restore once, hand off

use crate::config::{BootstrapConfig, RestorePolicy};
use crate::error::Result;
use crate::handoff::{LaunchSpec, Launcher};
use crate::log_step;
use crate::migrations::Migrator;
use crate::readiness::{CancellationToken, Clock, ReadinessProbe, ReadinessWaiter};
use crate::restore::{self, RestoreDecision, RestoreOutcome, RestoreRequest, Restorer};
use crate::state::{SchemaState, StateDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    WaitDb,
    CheckState,
    Migrate,
    Restore,
    Handoff,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::WaitDb => "wait_db",
            Stage::CheckState => "check_state",
            Stage::Migrate => "migrate",
            Stage::Restore => "restore",
            Stage::Handoff => "handoff",
        }
    }
}

/// The external capabilities one bootstrap run drives.
pub struct Collaborators<'a> {
    pub probe: &'a dyn ReadinessProbe,
    pub clock: &'a dyn Clock,
    pub detector: &'a dyn StateDetector,
    pub migrator: &'a dyn Migrator,
    pub restorer: &'a dyn Restorer,
    pub launcher: &'a dyn Launcher,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub probe_attempts: u32,
    pub initial_state: SchemaState,
    pub migrated: bool,
    pub restore: RestoreDecision,
    pub restore_outcome: Option<RestoreOutcome>,
}

pub struct Bootstrapper<'a> {
    config: &'a BootstrapConfig,
    parts: Collaborators<'a>,
    cancel: CancellationToken,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(config: &'a BootstrapConfig, parts: Collaborators<'a>) -> Self {
        Self {
            config,
            parts,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn wait_for_database(&self) -> Result<u32> {
        let waiter = ReadinessWaiter::new(self.parts.probe, self.parts.clock);
        waiter.wait(&self.config.target(), &self.cancel).await
    }

    pub async fn check_state(&self) -> Result<SchemaState> {
        self.parts.detector.detect(&self.config.sentinel_table).await
    }

    /// Wait and report the schema state without changing anything.
    pub async fn status(&self) -> Result<SchemaState> {
        self.wait_for_database().await?;
        self.check_state().await
    }

    /// Every step before the handoff.
    pub async fn prepare(&self) -> Result<BootstrapReport> {
        let probe_attempts = self.wait_for_database().await?;
        let initial_state = self.check_state().await?;

        let migrated = match initial_state {
            SchemaState::Initialized => {
                log_step!(info, Stage::Migrate.as_str(), "database already initialized, skipping migrations and restore");
                false
            }
            SchemaState::Uninitialized => {
                self.parts
                    .migrator
                    .upgrade_to_head(&self.config.database.url)
                    .await?;
                true
            }
        };

        let restore_cfg = &self.config.restore;
        let decision = RestoreDecision::decide(migrated, restore_cfg.enabled, &restore_cfg.dump_path);
        let restore_outcome = match decision {
            RestoreDecision::Run => Some(self.run_restore().await?),
            RestoreDecision::SkipMissingDump => {
                log_step!(
                    warn,
                    Stage::Restore.as_str(),
                    dump = %restore_cfg.dump_path.display(),
                    "restore enabled but dump file not found, skipping"
                );
                None
            }
            other => {
                log_step!(debug, Stage::Restore.as_str(), decision = other.as_str(), "restore skipped");
                None
            }
        };

        Ok(BootstrapReport {
            probe_attempts,
            initial_state,
            migrated,
            restore: decision,
            restore_outcome,
        })
    }

    async fn run_restore(&self) -> Result<RestoreOutcome> {
        let restore_cfg = &self.config.restore;
        let policy = self.config.restore_policy();
        let request = RestoreRequest {
            database_url: self.config.database.url.clone(),
            dump_path: restore_cfg.dump_path.clone(),
            jobs: restore_cfg.jobs,
        };

        let outcome = self.parts.restorer.restore(&request).await?;

        if policy == RestorePolicy::Strict && outcome.succeeded && !outcome.error_output.trim().is_empty() {
            log_step!(
                warn,
                Stage::Restore.as_str(),
                stderr = %outcome.error_output.trim(),
                "restore succeeded with diagnostics on stderr"
            );
        }
        if policy == RestorePolicy::Lenient && !outcome.succeeded {
            log_step!(
                warn,
                Stage::Restore.as_str(),
                exit_code = ?outcome.exit_code,
                "restore tool exited nonzero, checking captured errors"
            );
        }

        restore::evaluate(policy, &outcome, &restore_cfg.benign_patterns, &restore_cfg.error_log_path)?;
        log_step!(info, Stage::Restore.as_str(), policy = %policy, "reference data restored");
        Ok(outcome)
    }

    /// Full sequence. With a real launcher this only returns on failure.
    pub async fn run(&self) -> Result<BootstrapReport> {
        let spec = LaunchSpec::from_config(self.config)?;
        let report = self.prepare().await?;
        self.parts.launcher.launch(&spec)?;
        Ok(report)
    }
}
