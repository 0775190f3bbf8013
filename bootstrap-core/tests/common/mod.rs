//! Recording fakes for the bootstrap seams

#![allow(dead_code)]

use async_trait::async_trait;
use bootstrap_core::config::{BootstrapConfig, ConnectionTarget, RestorePolicy};
use bootstrap_core::error::{BootstrapError, Result};
use bootstrap_core::handoff::{LaunchSpec, Launcher};
use bootstrap_core::migrations::{MigrationError, Migrator};
use bootstrap_core::readiness::{CancellationToken, Clock, ReadinessProbe};
use bootstrap_core::restore::{RestoreError, RestoreOutcome, RestoreRequest, Restorer};
use bootstrap_core::state::{SchemaState, StateDetector};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOOLING_URL: &str = "postgresql://app:secret@db:5432/trava";

/// Shared, ordered record of which collaborator ran.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<&'static str>>>);

impl Journal {
    pub fn record(&self, entry: &'static str) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

pub fn config(enabled: bool, policy: Option<RestorePolicy>, dump_path: &Path) -> BootstrapConfig {
    let mut config = BootstrapConfig::default();
    config.database.url = TOOLING_URL.to_string();
    config.database.host = Some("db".to_string());
    config.restore.enabled = enabled;
    config.restore.policy = policy;
    config.restore.dump_path = dump_path.to_path_buf();
    config.finalize().expect("test config should be valid")
}

/// Refuses connections for the first `failures` attempts.
pub struct ScriptedProbe {
    failures: u32,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn ready_after(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn never() -> Self {
        Self::ready_after(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    async fn probe(&self, _target: &ConnectionTarget) -> io::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
        } else {
            Ok(())
        }
    }
}

/// Records requested sleeps instead of waiting; can cancel after a number of them.
#[derive(Default)]
pub struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(sleeps: usize, token: CancellationToken) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            cancel_after: Some((sleeps, token)),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        let mut sleeps = self.sleeps.lock().unwrap();
        sleeps.push(duration);
        if let Some((limit, token)) = &self.cancel_after {
            if sleeps.len() >= *limit {
                token.cancel();
            }
        }
    }
}

pub struct FakeDetector {
    state: Option<SchemaState>,
    journal: Journal,
    pub sentinels: Mutex<Vec<String>>,
}

impl FakeDetector {
    pub fn new(state: SchemaState, journal: Journal) -> Self {
        Self {
            state: Some(state),
            journal,
            sentinels: Mutex::new(Vec::new()),
        }
    }

    /// Detector whose query cannot execute.
    pub fn broken(journal: Journal) -> Self {
        Self {
            state: None,
            journal,
            sentinels: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StateDetector for FakeDetector {
    async fn detect(&self, sentinel: &str) -> Result<SchemaState> {
        self.journal.record("detect");
        self.sentinels.lock().unwrap().push(sentinel.to_string());
        self.state
            .ok_or(BootstrapError::Query(sqlx::Error::PoolTimedOut))
    }
}

pub struct FakeMigrator {
    exit_code: Option<i32>,
    journal: Journal,
    pub urls: Mutex<Vec<String>>,
}

impl FakeMigrator {
    pub fn succeeding(journal: Journal) -> Self {
        Self {
            exit_code: None,
            journal,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(code: i32, journal: Journal) -> Self {
        Self {
            exit_code: Some(code),
            journal,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl Migrator for FakeMigrator {
    async fn upgrade_to_head(&self, database_url: &str) -> std::result::Result<(), MigrationError> {
        self.journal.record("migrate");
        self.urls.lock().unwrap().push(database_url.to_string());
        match self.exit_code {
            None => Ok(()),
            Some(code) => Err(MigrationError::Failed {
                program: "alembic".to_string(),
                code: Some(code),
                status: format!("exit status: {}", code),
            }),
        }
    }
}

pub struct FakeRestorer {
    outcome: RestoreOutcome,
    journal: Journal,
    pub requests: Mutex<Vec<RestoreRequest>>,
}

impl FakeRestorer {
    pub fn new(outcome: RestoreOutcome, journal: Journal) -> Self {
        Self {
            outcome,
            journal,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn clean(journal: Journal) -> Self {
        Self::new(
            RestoreOutcome {
                succeeded: true,
                exit_code: Some(0),
                ..RestoreOutcome::default()
            },
            journal,
        )
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Restorer for FakeRestorer {
    async fn restore(&self, request: &RestoreRequest) -> std::result::Result<RestoreOutcome, RestoreError> {
        self.journal.record("restore");
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.outcome.clone())
    }
}

pub struct FakeLauncher {
    journal: Journal,
    pub launches: Mutex<Vec<LaunchSpec>>,
}

impl FakeLauncher {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        self.journal.record("handoff");
        self.launches.lock().unwrap().push(spec.clone());
        Ok(())
    }
}
