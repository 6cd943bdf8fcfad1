use cdc_config::shared::IntoConnectOptions;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use crate::connection::{ConnectionPoolFactory, ConnectionPoolId, KeyedConnectionPools};
use crate::error::{CdcError, CdcResult};
use crate::source::postgres::{PG_ENGINE, PgSourceConfig};

/// Pool cache for PostgreSQL sources.
pub type PgConnectionPools = KeyedConnectionPools<PgConnectionPoolFactory>;

/// Builds sqlx [`PgPool`]s for PostgreSQL sources.
///
/// Pools hold up to [`PgSourceConfig::connection_pool_size`] connections and wait at
/// most [`PgSourceConfig::connect_timeout`] for a connection. One connection is opened
/// eagerly so that an unreachable or misconfigured source fails at creation time
/// instead of on the first read.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnectionPoolFactory;

impl PgConnectionPoolFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ConnectionPoolFactory for PgConnectionPoolFactory {
    type Pool = PgPool;
    type Config = PgSourceConfig;

    fn engine(&self) -> &'static str {
        PG_ENGINE
    }

    async fn create_pool(
        &self,
        pool_id: &ConnectionPoolId,
        source_config: &PgSourceConfig,
    ) -> CdcResult<PgPool> {
        debug!(
            %pool_id,
            max_connections = source_config.connection_pool_size(),
            "opening postgres connection pool"
        );

        PgPoolOptions::new()
            .min_connections(1)
            .max_connections(source_config.connection_pool_size())
            .acquire_timeout(source_config.connect_timeout())
            .connect_with(source_config.connection().with_db())
            .await
            .map_err(CdcError::from)
    }
}
