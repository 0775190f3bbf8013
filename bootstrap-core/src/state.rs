/// Detects whether the database has already been bootstrapped

use crate::error::Result;
use crate::log_step;
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Initialized,
    Uninitialized,
}

impl SchemaState {
    pub fn from_sentinel(present: bool) -> Self {
        if present {
            SchemaState::Initialized
        } else {
            SchemaState::Uninitialized
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self, SchemaState::Initialized)
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaState::Initialized => write!(f, "initialized"),
            SchemaState::Uninitialized => write!(f, "uninitialized"),
        }
    }
}

#[async_trait]
pub trait StateDetector: Send + Sync {
    async fn detect(&self, sentinel: &str) -> Result<SchemaState>;
}

/// Matches only the configured schema, or the connection's current one.
pub const SENTINEL_QUERY: &str = r#"
    SELECT 1
    FROM information_schema.tables
    WHERE table_name = $1
      AND table_schema::text = COALESCE($2::text, current_schema()::text)
    LIMIT 1
"#;

/// Runs the sentinel lookup over a dedicated connection, closed afterwards.
pub struct PgStateDetector {
    url: String,
    schema: Option<String>,
}

impl PgStateDetector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl StateDetector for PgStateDetector {
    async fn detect(&self, sentinel: &str) -> Result<SchemaState> {
        let mut conn = PgConnection::connect(&self.url).await?;

        let found = sqlx::query_scalar::<_, i32>(SENTINEL_QUERY)
            .bind(sentinel)
            .bind(self.schema.as_deref())
            .fetch_optional(&mut conn)
            .await?;

        if let Err(e) = conn.close().await {
            log_step!(warn, "check_state", error = %e, "failed to close state connection");
        }

        let state = SchemaState::from_sentinel(found.is_some());
        log_step!(
            info,
            "check_state",
            sentinel,
            schema = self.schema.as_deref().unwrap_or("current_schema()"),
            state = %state,
            "schema state detected"
        );
        Ok(state)
    }
}
