/// Startup configuration, resolved once and shared read-only by every step

use crate::error::{BootstrapError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

pub const CONFIG_PATH_ENV: &str = "BOOTSTRAP_CONFIG";
const DEFAULT_POSTGRES_HOST: &str = "localhost";
const DEFAULT_POSTGRES_PORT: u16 = 5432;
const REDACTED: &str = "***";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestorePolicy {
    /// Restore tool exit status decides the outcome.
    Strict,
    /// Exit status is ignored; the captured error stream decides the outcome.
    Lenient,
}

impl FromStr for RestorePolicy {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(RestorePolicy::Strict),
            "lenient" => Ok(RestorePolicy::Lenient),
            other => Err(BootstrapError::InvalidConfig(format!(
                "unknown restore policy '{}', expected 'strict' or 'lenient'",
                other
            ))),
        }
    }
}

impl fmt::Display for RestorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestorePolicy::Strict => write!(f, "strict"),
            RestorePolicy::Lenient => write!(f, "lenient"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(BootstrapError::InvalidConfig(format!(
                "unknown log format '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Taken from the URL when unset; must agree with it when set.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    /// URL handed to the migration and restore tools. Composed when empty.
    pub url: String,
    /// URL handed to the application server. Derived from `url` when empty.
    pub app_url: String,
    pub scheme: String,
    pub app_scheme: String,
    /// Environment variable that carries the URL into child processes.
    pub url_env: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            user: None,
            password: None,
            name: None,
            url: String::new(),
            app_url: String::new(),
            scheme: "postgresql".to_string(),
            app_scheme: "postgresql+asyncpg".to_string(),
            url_env: "DATABASE_URL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub command: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            command: vec!["alembic".to_string(), "upgrade".to_string(), "head".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    pub enabled: bool,
    pub policy: Option<RestorePolicy>,
    pub dump_path: PathBuf,
    pub log_path: PathBuf,
    pub error_log_path: PathBuf,
    pub jobs: u32,
    pub command: Vec<String>,
    /// Error-stream lines containing any of these are not counted as failures.
    pub benign_patterns: Vec<String>,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: None,
            dump_path: PathBuf::from("/app/dump.dump"),
            log_path: PathBuf::from("/tmp/restore.log"),
            error_log_path: PathBuf::from("/tmp/restore_errors.log"),
            jobs: 4,
            command: vec!["pg_restore".to_string()],
            benign_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub command: Vec<String>,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: vec!["uvicorn".to_string(), "main:app".to_string()],
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub sentinel_table: String,
    /// Schema searched for the sentinel; the connection's current schema when unset.
    pub sentinel_schema: Option<String>,
    pub database: DatabaseConfig,
    pub migration: MigrationConfig,
    pub restore: RestoreConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            sentinel_table: "alembic_version".to_string(),
            sentinel_schema: None,
            database: DatabaseConfig::default(),
            migration: MigrationConfig::default(),
            restore: RestoreConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Reachability target for the readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub connection_url: String,
}

impl ConnectionTarget {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn address(&self) -> String {
        format!("{}:{}", bracket_host(&self.host), self.port)
    }
}

/// Values supplied on the command line, applied after the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub load_dump: Option<bool>,
    pub restore_policy: Option<RestorePolicy>,
    pub log_format: Option<LogFormat>,
}

impl BootstrapConfig {
    /// Layers defaults, the optional TOML file, the environment and the overrides.
    pub fn load<F>(path: Option<&Path>, lookup: F, overrides: &ConfigOverrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| lookup(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.apply_overrides(overrides);
        config.finalize()
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None, |key| std::env::var(key).ok(), &ConfigOverrides::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| BootstrapError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(v) = lookup("POSTGRES_HOST") {
            db.host = Some(v);
        }
        if let Some(v) = lookup("POSTGRES_PORT") {
            db.port = Some(parse_port("POSTGRES_PORT", &v)?);
        }
        if let Some(v) = lookup("POSTGRES_USER") {
            db.user = Some(v);
        }
        if let Some(v) = lookup("POSTGRES_PASSWORD") {
            db.password = Some(v);
        }
        if let Some(v) = lookup("POSTGRES_DB") {
            db.name = Some(v);
        }
        if let Some(v) = lookup("DATABASE_URL") {
            db.url = v;
        }
        if let Some(v) = lookup("DATABASE_URL_ASYNC") {
            db.app_url = v;
        }
        if let Some(v) = lookup("SENTINEL_TABLE") {
            self.sentinel_table = v;
        }
        if let Some(v) = lookup("SENTINEL_SCHEMA") {
            self.sentinel_schema = Some(v).filter(|s| !s.trim().is_empty());
        }

        let restore = &mut self.restore;
        if let Some(v) = lookup("LOAD_DUMP") {
            restore.enabled = parse_flag("LOAD_DUMP", &v)?;
        }
        if let Some(v) = lookup("RESTORE_POLICY") {
            restore.policy = Some(v.parse()?);
        }
        if let Some(v) = lookup("DUMP_PATH") {
            restore.dump_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RESTORE_LOG_PATH") {
            restore.log_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RESTORE_ERROR_LOG_PATH") {
            restore.error_log_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RESTORE_JOBS") {
            restore.jobs = v.trim().parse().map_err(|_| {
                BootstrapError::InvalidConfig(format!("RESTORE_JOBS must be a positive integer, got '{}'", v))
            })?;
        }

        if let Some(v) = lookup("APP_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("APP_PORT") {
            self.server.port = parse_port("APP_PORT", &v)?;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.logging.format = v.parse()?;
        }

        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(load_dump) = overrides.load_dump {
            self.restore.enabled = load_dump;
        }
        if let Some(policy) = overrides.restore_policy {
            self.restore.policy = Some(policy);
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    /// Resolves connection URLs and rejects inconsistent settings.
    pub fn finalize(mut self) -> Result<Self> {
        if self.sentinel_table.trim().is_empty() {
            return Err(BootstrapError::InvalidConfig("sentinel_table must not be empty".to_string()));
        }
        require_command("migration.command", &self.migration.command)?;
        require_command("restore.command", &self.restore.command)?;
        require_command("server.command", &self.server.command)?;

        if self.restore.jobs == 0 {
            return Err(BootstrapError::InvalidConfig("restore.jobs must be at least 1".to_string()));
        }
        if self.restore.enabled && self.restore.policy.is_none() {
            return Err(BootstrapError::InvalidConfig(
                "restore is enabled but no restore policy is set (RESTORE_POLICY=strict|lenient)"
                    .to_string(),
            ));
        }

        let db = &mut self.database;
        match (db.url.is_empty(), db.app_url.is_empty()) {
            (true, true) => {
                db.url = compose_url(db, &db.scheme)?;
                db.app_url = compose_url(db, &db.app_scheme)?;
            }
            (false, true) => db.app_url = with_scheme(&db.url, &db.app_scheme)?,
            (true, false) => db.url = with_scheme(&db.app_url, &db.scheme)?,
            (false, false) => ensure_same_database(&db.url, &db.app_url)?,
        }
        resolve_endpoint(db)?;

        Ok(self)
    }

    pub fn target(&self) -> ConnectionTarget {
        ConnectionTarget {
            host: self
                .database
                .host
                .clone()
                .unwrap_or_else(|| DEFAULT_POSTGRES_HOST.to_string()),
            port: self.database.port.unwrap_or(DEFAULT_POSTGRES_PORT),
            connection_url: self.database.url.clone(),
        }
    }

    /// Restore policy to apply; only meaningful when restore is enabled.
    pub fn restore_policy(&self) -> RestorePolicy {
        self.restore.policy.unwrap_or(RestorePolicy::Strict)
    }

    /// Copy safe to print: passwords are masked in every field that carries one.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.database.password.is_some() {
            copy.database.password = Some(REDACTED.to_string());
        }
        copy.database.url = redact_url(&copy.database.url);
        copy.database.app_url = redact_url(&copy.database.app_url);
        copy
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BootstrapError::InvalidConfig(e.to_string()))
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value.trim().parse().map_err(|_| {
        BootstrapError::InvalidConfig(format!("{} must be a port number, got '{}'", key, value))
    })
}

pub fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(BootstrapError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn require_command(key: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(BootstrapError::InvalidConfig(format!("{} must name a program", key))),
    }
}

fn invalid_url(url: &str, reason: impl fmt::Display) -> BootstrapError {
    BootstrapError::InvalidConfig(format!("invalid database url '{}': {}", redact_url(url), reason))
}

fn compose_url(db: &DatabaseConfig, scheme: &str) -> Result<String> {
    let name = db.name.as_deref().filter(|n| !n.is_empty()).ok_or_else(|| {
        BootstrapError::InvalidConfig("POSTGRES_DB or DATABASE_URL must be set".to_string())
    })?;

    let host = db.host.as_deref().unwrap_or(DEFAULT_POSTGRES_HOST);
    let port = db.port.unwrap_or(DEFAULT_POSTGRES_PORT);
    let base = format!("{}://{}:{}/", scheme, bracket_host(host), port);
    let mut url = Url::parse(&base).map_err(|e| invalid_url(&base, e))?;
    if let Some(user) = &db.user {
        url.set_username(user).map_err(|_| invalid_url(&base, "cannot carry a user name"))?;
    }
    if let Some(password) = &db.password {
        url.set_password(Some(password))
            .map_err(|_| invalid_url(&base, "cannot carry a password"))?;
    }
    url.set_path(&format!("/{}", name));
    Ok(url.to_string())
}

fn with_scheme(raw: &str, scheme: &str) -> Result<String> {
    let mut url = Url::parse(raw).map_err(|e| invalid_url(raw, e))?;
    url.set_scheme(scheme)
        .map_err(|_| invalid_url(raw, format!("cannot switch scheme to {}", scheme)))?;
    Ok(url.to_string())
}

/// Makes the probe target the host and port the URLs connect to.
fn resolve_endpoint(db: &mut DatabaseConfig) -> Result<()> {
    let url = Url::parse(&db.url).map_err(|e| invalid_url(&db.url, e))?;

    if let Some(url_host) = url.host_str().map(unbracket).filter(|h| !h.is_empty()) {
        if let Some(host) = &db.host {
            if !unbracket(host).eq_ignore_ascii_case(url_host) {
                return Err(BootstrapError::InvalidConfig(format!(
                    "POSTGRES_HOST '{}' does not match the database url host '{}'",
                    host, url_host
                )));
            }
        }
        db.host = Some(url_host.to_string());
    }

    let url_port = url.port().unwrap_or(DEFAULT_POSTGRES_PORT);
    match db.port {
        Some(port) if port != url_port => Err(BootstrapError::InvalidConfig(format!(
            "POSTGRES_PORT {} does not match the database url port {}",
            port, url_port
        ))),
        _ => {
            db.port = Some(url_port);
            Ok(())
        }
    }
}

fn unbracket(host: &str) -> &str {
    host.trim_start_matches('[').trim_end_matches(']')
}

fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

fn ensure_same_database(url: &str, app_url: &str) -> Result<()> {
    let a = Url::parse(url).map_err(|e| invalid_url(url, e))?;
    let b = Url::parse(app_url).map_err(|e| invalid_url(app_url, e))?;

    let key = |u: &Url| {
        (
            u.host_str().map(str::to_ascii_lowercase),
            u.port().unwrap_or(DEFAULT_POSTGRES_PORT),
            u.path().trim_start_matches('/').to_string(),
        )
    };
    if key(&a) != key(&b) {
        return Err(BootstrapError::InvalidConfig(format!(
            "DATABASE_URL and DATABASE_URL_ASYNC point at different databases ({} vs {})",
            redact_url(url),
            redact_url(app_url)
        )));
    }
    Ok(())
}

pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some(REDACTED)).is_err() {
                return REDACTED.to_string();
            }
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) if raw.is_empty() => String::new(),
        Err(_) => REDACTED.to_string(),
    }
}
