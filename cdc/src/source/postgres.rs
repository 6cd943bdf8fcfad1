//! PostgreSQL logical replication source configuration.

use std::time::Duration;

use cdc_config::shared::{PgConnectionConfig, StartupOptions};

use crate::connection::ConnectionPoolId;
use crate::error::CdcResult;
use crate::metrics::{DATABASE_NAME_LABEL, SCHEMA_NAME_LABEL, TABLE_NAME_LABEL};
use crate::source::{MetricConfig, SourceConfig};

/// Engine name used in pool ids and metric labels.
pub const PG_ENGINE: &str = "postgres";

/// Label names attached to every PostgreSQL source metric, in order.
pub const PG_METRIC_LABELS: &[&str] = &[DATABASE_NAME_LABEL, SCHEMA_NAME_LABEL, TABLE_NAME_LABEL];

/// Immutable configuration of a PostgreSQL source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PgSourceConfig {
    connection: PgConnectionConfig,
    table_list: Option<Vec<String>>,
    fetch_size: u32,
    startup_options: StartupOptions,
    split_size_mb: u32,
    split_meta_group_size: u32,
    include_schema_changes: bool,
    connection_pool_size: u32,
    connect_timeout: Duration,
    metric_identifier: Option<String>,
    audit_identifier: Option<String>,
}

impl PgSourceConfig {
    pub fn builder(connection: PgConnectionConfig) -> PgSourceConfigBuilder {
        PgSourceConfigBuilder::new(connection)
    }

    pub fn connection(&self) -> &PgConnectionConfig {
        &self.connection
    }

    /// Tables to capture as `schema.table`. `None` captures every published table.
    pub fn table_list(&self) -> Option<&[String]> {
        self.table_list.as_deref()
    }

    /// Rows fetched per round trip while snapshotting.
    pub fn fetch_size(&self) -> u32 {
        self.fetch_size
    }

    /// Maximum number of connections in the source's pool.
    pub fn connection_pool_size(&self) -> u32 {
        self.connection_pool_size
    }

    /// How long pool creation and acquisition wait for a connection.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the id of the connection pool this source reads through.
    ///
    /// The password is not part of the id; the database and TLS mode are, since both
    /// change what a pooled connection talks to.
    pub fn connection_pool_id(&self) -> ConnectionPoolId {
        let host = format!("{}:{}", self.connection.host, self.connection.port);

        ConnectionPoolId::new(PG_ENGINE, [host], Some(self.connection.username.clone()))
            .with_option("database", self.connection.name.clone())
            .with_option("tls", self.connection.tls.enabled.to_string())
    }
}

impl SourceConfig for PgSourceConfig {
    fn startup_options(&self) -> &StartupOptions {
        &self.startup_options
    }

    fn split_size(&self) -> u32 {
        self.split_size_mb
    }

    fn split_meta_group_size(&self) -> u32 {
        self.split_meta_group_size
    }

    fn include_schema_changes(&self) -> bool {
        self.include_schema_changes
    }
}

impl MetricConfig for PgSourceConfig {
    fn metric_identifier(&self) -> Option<&str> {
        self.metric_identifier.as_deref()
    }

    fn audit_identifier(&self) -> Option<&str> {
        self.audit_identifier.as_deref()
    }

    fn metric_labels(&self) -> &'static [&'static str] {
        PG_METRIC_LABELS
    }
}

impl From<&PgSourceConfig> for ConnectionPoolId {
    fn from(config: &PgSourceConfig) -> Self {
        config.connection_pool_id()
    }
}

/// Builder for [`PgSourceConfig`].
#[derive(Debug, Clone)]
pub struct PgSourceConfigBuilder {
    config: PgSourceConfig,
}

impl PgSourceConfigBuilder {
    pub const DEFAULT_FETCH_SIZE: u32 = 1024;

    pub const DEFAULT_SPLIT_SIZE_MB: u32 = 64;

    pub const DEFAULT_SPLIT_META_GROUP_SIZE: u32 = 1000;

    pub const DEFAULT_CONNECTION_POOL_SIZE: u32 = 20;

    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(connection: PgConnectionConfig) -> Self {
        Self {
            config: PgSourceConfig {
                connection,
                table_list: None,
                fetch_size: Self::DEFAULT_FETCH_SIZE,
                startup_options: StartupOptions::default(),
                split_size_mb: Self::DEFAULT_SPLIT_SIZE_MB,
                split_meta_group_size: Self::DEFAULT_SPLIT_META_GROUP_SIZE,
                include_schema_changes: false,
                connection_pool_size: Self::DEFAULT_CONNECTION_POOL_SIZE,
                connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
                metric_identifier: None,
                audit_identifier: None,
            },
        }
    }

    pub fn table_list<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.table_list = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn fetch_size(mut self, fetch_size: u32) -> Self {
        self.config.fetch_size = fetch_size;
        self
    }

    pub fn startup_options(mut self, startup_options: StartupOptions) -> Self {
        self.config.startup_options = startup_options;
        self
    }

    pub fn split_size_mb(mut self, split_size_mb: u32) -> Self {
        self.config.split_size_mb = split_size_mb;
        self
    }

    pub fn split_meta_group_size(mut self, split_meta_group_size: u32) -> Self {
        self.config.split_meta_group_size = split_meta_group_size;
        self
    }

    pub fn include_schema_changes(mut self, include_schema_changes: bool) -> Self {
        self.config.include_schema_changes = include_schema_changes;
        self
    }

    pub fn connection_pool_size(mut self, connection_pool_size: u32) -> Self {
        self.config.connection_pool_size = connection_pool_size;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.config.connect_timeout = connect_timeout;
        self
    }

    pub fn metric_identifier(mut self, metric_identifier: impl Into<String>) -> Self {
        self.config.metric_identifier = Some(metric_identifier.into());
        self
    }

    pub fn audit_identifier(mut self, audit_identifier: impl Into<String>) -> Self {
        self.config.audit_identifier = Some(audit_identifier.into());
        self
    }

    /// Validates the connection settings and builds the configuration.
    ///
    /// Fails with [`crate::error::ErrorKind::ConfigError`] when the host or database
    /// name is blank, or when TLS is enabled without root certificates.
    pub fn build(self) -> CdcResult<PgSourceConfig> {
        self.config.connection.validate()?;

        Ok(self.config)
    }
}
