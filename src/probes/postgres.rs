//! PostgreSQL probes through the service's own `sqlx` pool.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{DependencyCheck, ProbeFailure};
use crate::context::RunContext;
use crate::scheduler::UnitScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostgresProbeKind {
    /// `SELECT 1` round trip
    Connectivity,
    /// A query run inside a `READ ONLY` transaction that is always rolled back
    ReadOnlyQuery(String),
}

#[derive(Debug, Clone)]
pub struct PostgresProbe {
    pool: PgPool,
    kind: PostgresProbeKind,
}

impl PostgresProbe {
    pub fn connectivity(pool: PgPool) -> Self {
        Self {
            pool,
            kind: PostgresProbeKind::Connectivity,
        }
    }

    pub fn read_only_query(pool: PgPool, sql: impl Into<String>) -> Self {
        Self {
            pool,
            kind: PostgresProbeKind::ReadOnlyQuery(sql.into()),
        }
    }

    pub fn kind(&self) -> &PostgresProbeKind {
        &self.kind
    }
}

fn map_sqlx_error(stage: &str, error: sqlx::Error) -> ProbeFailure {
    let detail = match &error {
        sqlx::Error::PoolTimedOut => "connection pool timed out".to_string(),
        sqlx::Error::PoolClosed => "connection pool is closed".to_string(),
        sqlx::Error::Database(db) => format!(
            "database error{}",
            db.code().map(|code| format!(" {code}")).unwrap_or_default()
        ),
        sqlx::Error::Io(io) => format!("io error: {}", io.kind()),
        other => other.to_string(),
    };
    ProbeFailure::dependency(format!("{stage}: {detail}"))
}

#[async_trait]
impl DependencyCheck for PostgresProbe {
    async fn probe(&self, _ctx: &RunContext, scope: &UnitScope) -> Result<String, ProbeFailure> {
        match &self.kind {
            PostgresProbeKind::Connectivity => {
                scope.mark("awaiting SELECT 1 round trip");
                let value: i32 = sqlx::query_scalar("SELECT 1")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("connectivity", e))?;
                if value != 1 {
                    return Err(ProbeFailure::dependency(format!(
                        "connectivity: unexpected SELECT 1 result {value}"
                    )));
                }
                Ok("postgres reachable".to_string())
            }
            PostgresProbeKind::ReadOnlyQuery(sql) => {
                scope.mark("opening read-only transaction");
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| map_sqlx_error("begin", e))?;
                sqlx::query("SET TRANSACTION READ ONLY")
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("set read only", e))?;

                scope.mark("awaiting read-only query");
                let rows = sqlx::query(sql)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("query", e))?;
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;

                debug!(rows = rows.len(), "Postgres behavioral probe completed");
                Ok(format!("read-only query returned {} rows", rows.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FailureCategory;

    #[test]
    fn test_pool_timeout_maps_to_dependency() {
        let failure = map_sqlx_error("connectivity", sqlx::Error::PoolTimedOut);
        assert_eq!(failure.category, FailureCategory::Dependency);
        assert_eq!(failure.message, "connectivity: connection pool timed out");
    }

    #[tokio::test]
    async fn test_kinds_are_built_from_lazy_pool() {
        let pool = PgPool::connect_lazy("postgres://diagnostics@localhost/diagnostics").unwrap();
        let probe = PostgresProbe::read_only_query(pool.clone(), "SELECT id FROM orders LIMIT 1");
        assert_eq!(
            probe.kind(),
            &PostgresProbeKind::ReadOnlyQuery("SELECT id FROM orders LIMIT 1".to_string())
        );
        assert_eq!(
            PostgresProbe::connectivity(pool).kind(),
            &PostgresProbeKind::Connectivity
        );
    }
}
