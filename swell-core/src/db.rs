//! Read-only connectivity check against the PostgreSQL persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::error::ConfigError;

#[async_trait]
pub trait DatabaseProbe: Send + Sync + std::fmt::Debug {
    /// Round-trip a trivial query. `Err` carries a display-ready reason.
    async fn ping(&self) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct PgProbe {
    pool: PgPool,
}

impl PgProbe {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

    /// Build a pool without connecting. A malformed URL fails here; an unreachable server only
    /// shows up on [`DatabaseProbe::ping`].
    pub fn connect_lazy(database_url: &str) -> Result<Self, ConfigError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .connect_lazy(database_url)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseProbe for PgProbe {
    async fn ping(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
