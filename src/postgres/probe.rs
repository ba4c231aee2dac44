use crate::util::errors::Result;
use crate::util::secrets::Credentials;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

// Keep well below max_connections of the instance we are watching
pub const MAX_CONNECTIONS: u32 = 50;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sessions that count as activity: everything except our own backend and replication.
pub const ACTIVE_SESSIONS_QUERY: &str = "SELECT COUNT(*) FROM pg_stat_activity \
    WHERE state IN ('active', 'idle', 'idle in transaction') \
    AND pg_backend_pid() != pg_stat_activity.pid \
    AND usename != 'streaming_replica';";

/// Source of the open session count of the monitored database
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ActivityProbe: Send + Sync {
    /// Number of client sessions currently open against the instance
    async fn count_active_sessions(&self) -> Result<i64>;

    /// Release every pooled connection
    async fn close(&self);
}

/// Builds a probe from freshly read credentials
pub type ProbeFactory = Box<dyn Fn(&Credentials) -> Result<Box<dyn ActivityProbe>> + Send + Sync>;

pub fn pg_probe_factory() -> ProbeFactory {
    Box::new(|credentials: &Credentials| -> Result<Box<dyn ActivityProbe>> {
        Ok(Box::new(PgActivityProbe::connect_lazy(credentials)))
    })
}

pub struct PgActivityProbe {
    pool: PgPool,
}

impl PgActivityProbe {
    /// Create the pool without opening a connection; the first query connects.
    pub fn connect_lazy(credentials: &Credentials) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(connect_options(credentials));
        Self { pool }
    }
}

#[async_trait]
impl ActivityProbe for PgActivityProbe {
    async fn count_active_sessions(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(ACTIVE_SESSIONS_QUERY)
            .fetch_one(&self.pool)
            .await?;
        debug!("pg_stat_activity reports {} open sessions", count);
        Ok(count)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connect options for the local instance, TLS required
pub fn connect_options(credentials: &Credentials) -> PgConnectOptions {
    PgConnectOptions::new_without_pgpass()
        .host(&credentials.host)
        .port(credentials.port)
        .username(&credentials.username)
        .password(&credentials.password)
        .database(&credentials.database)
        .ssl_mode(PgSslMode::Require)
}
