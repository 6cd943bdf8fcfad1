//! MongoDB change stream source configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use cdc_config::SerializableSecretString;
use cdc_config::shared::{MongoDbSourceSettings, StartupOptions, ValidationError};
use secrecy::ExposeSecret;

use crate::bail;
use crate::connection::ConnectionPoolId;
use crate::error::{CdcResult, ErrorKind};
use crate::metrics::{COLLECTION_NAME_LABEL, DATABASE_NAME_LABEL};
use crate::source::{MetricConfig, SourceConfig};

/// Engine name used in pool ids and metric labels.
pub const MONGODB_ENGINE: &str = "mongodb";

const MONGODB_SCHEME: &str = "mongodb://";

/// Label names attached to every MongoDB source metric, in order.
pub const MONGODB_METRIC_LABELS: &[&str] = &[DATABASE_NAME_LABEL, COLLECTION_NAME_LABEL];

/// Immutable configuration of a MongoDB change stream source.
///
/// Built once per job by [`MongoDbSourceConfigBuilder`] and then shared read-only by
/// every read task. The connection string is derived during the build and never
/// recomputed.
///
/// Equality and hashing cover every field, the derived connection string included, so
/// two configurations built from the same inputs are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MongoDbSourceConfig {
    hosts: String,
    username: Option<String>,
    password: Option<SerializableSecretString>,
    database_list: Option<Vec<String>>,
    collection_list: Option<Vec<String>>,
    connection_string: SerializableSecretString,
    batch_size: u32,
    poll_await_time_ms: u32,
    poll_max_batch_size: u32,
    update_lookup: bool,
    startup_options: StartupOptions,
    heartbeat_interval_ms: u32,
    split_meta_group_size: u32,
    split_size_mb: u32,
    include_schema_changes: bool,
    metric_identifier: Option<String>,
    audit_identifier: Option<String>,
    pool_id: ConnectionPoolId,
}

impl MongoDbSourceConfig {
    pub fn builder() -> MongoDbSourceConfigBuilder {
        MongoDbSourceConfigBuilder::new()
    }

    /// Returns the comma-separated host list as configured.
    pub fn hosts(&self) -> &str {
        &self.hosts
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|password| password.expose_secret().as_str())
    }

    pub fn database_list(&self) -> Option<&[String]> {
        self.database_list.as_deref()
    }

    pub fn collection_list(&self) -> Option<&[String]> {
        self.collection_list.as_deref()
    }

    /// Returns the `mongodb://` connection string. Contains the password when one is set.
    pub fn connection_string(&self) -> &str {
        self.connection_string.expose_secret()
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn poll_await_time(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_await_time_ms))
    }

    pub fn poll_max_batch_size(&self) -> u32 {
        self.poll_max_batch_size
    }

    /// Returns whether update events are looked up to carry the full document.
    pub fn update_lookup(&self) -> bool {
        self.update_lookup
    }

    /// Returns the heartbeat interval, or `None` when heartbeats are disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0)
            .then(|| Duration::from_millis(u64::from(self.heartbeat_interval_ms)))
    }

    /// Returns the id of the connection pool this source reads through.
    pub fn connection_pool_id(&self) -> &ConnectionPoolId {
        &self.pool_id
    }
}

impl SourceConfig for MongoDbSourceConfig {
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

impl MetricConfig for MongoDbSourceConfig {
    fn metric_identifier(&self) -> Option<&str> {
        self.metric_identifier.as_deref()
    }

    fn audit_identifier(&self) -> Option<&str> {
        self.audit_identifier.as_deref()
    }

    fn metric_labels(&self) -> &'static [&'static str] {
        MONGODB_METRIC_LABELS
    }
}

impl From<&MongoDbSourceConfig> for ConnectionPoolId {
    fn from(config: &MongoDbSourceConfig) -> Self {
        config.pool_id.clone()
    }
}

/// Builder for [`MongoDbSourceConfig`].
///
/// Every setter is optional except [`MongoDbSourceConfigBuilder::hosts`]. Numeric values
/// are used as given.
#[derive(Debug, Clone)]
pub struct MongoDbSourceConfigBuilder {
    settings: MongoDbSourceSettings,
}

impl MongoDbSourceConfigBuilder {
    pub fn new() -> Self {
        Self {
            settings: MongoDbSourceSettings::default(),
        }
    }

    /// Starts from raw job settings.
    pub fn from_settings(settings: MongoDbSourceSettings) -> Self {
        Self { settings }
    }

    /// Sets the comma-separated `host[:port]` list.
    pub fn hosts(mut self, hosts: impl Into<String>) -> Self {
        self.settings.hosts = Some(hosts.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.settings.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.settings.password = Some(SerializableSecretString::new(password.into()));
        self
    }

    pub fn database_list<I, S>(mut self, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.database_list = Some(databases.into_iter().map(Into::into).collect());
        self
    }

    pub fn collection_list<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.collection_list = Some(collections.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the `key=value&key=value` options appended to the connection string.
    pub fn connection_options(mut self, options: impl Into<String>) -> Self {
        self.settings.connection_options = Some(options.into());
        self
    }

    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.settings.batch_size = batch_size;
        self
    }

    pub fn poll_await_time_ms(mut self, poll_await_time_ms: u32) -> Self {
        self.settings.poll_await_time_ms = poll_await_time_ms;
        self
    }

    pub fn poll_max_batch_size(mut self, poll_max_batch_size: u32) -> Self {
        self.settings.poll_max_batch_size = poll_max_batch_size;
        self
    }

    pub fn update_lookup(mut self, update_lookup: bool) -> Self {
        self.settings.update_lookup = update_lookup;
        self
    }

    pub fn startup_options(mut self, startup_options: StartupOptions) -> Self {
        self.settings.startup_options = startup_options;
        self
    }

    pub fn heartbeat_interval_ms(mut self, heartbeat_interval_ms: u32) -> Self {
        self.settings.heartbeat_interval_ms = heartbeat_interval_ms;
        self
    }

    pub fn split_meta_group_size(mut self, split_meta_group_size: u32) -> Self {
        self.settings.split_meta_group_size = split_meta_group_size;
        self
    }

    pub fn split_size_mb(mut self, split_size_mb: u32) -> Self {
        self.settings.split_size_mb = split_size_mb;
        self
    }

    pub fn include_schema_changes(mut self, include_schema_changes: bool) -> Self {
        self.settings.include_schema_changes = include_schema_changes;
        self
    }

    pub fn metric_identifier(mut self, metric_identifier: impl Into<String>) -> Self {
        self.settings.metric_identifier = Some(metric_identifier.into());
        self
    }

    pub fn audit_identifier(mut self, audit_identifier: impl Into<String>) -> Self {
        self.settings.audit_identifier = Some(audit_identifier.into());
        self
    }

    /// Validates the settings and builds the configuration.
    ///
    /// Fails with [`ErrorKind::ConfigError`] when `hosts` is missing or blank, when a
    /// host entry is malformed, or when the connection options are not `key=value`
    /// pairs. The error detail names the offending field.
    pub fn build(self) -> CdcResult<MongoDbSourceConfig> {
        self.settings.validate()?;

        let settings = self.settings;
        let hosts = settings
            .hosts
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| ValidationError::MissingField("hosts".to_string()))?;

        let host_list = parse_hosts(hosts)?;
        let options = match settings.connection_options.as_deref() {
            Some(options) => parse_connection_options(options)?,
            None => BTreeMap::new(),
        };

        let password = settings
            .password
            .as_ref()
            .map(|password| password.expose_secret().as_str());
        let connection_string = build_connection_string(
            settings.username.as_deref(),
            password,
            hosts,
            settings.connection_options.as_deref(),
        )?;

        let pool_id = ConnectionPoolId::new(MONGODB_ENGINE, &host_list, settings.username.clone())
            .with_options(options);

        Ok(MongoDbSourceConfig {
            hosts: hosts.to_owned(),
            username: settings.username,
            password: settings.password,
            database_list: settings.database_list,
            collection_list: settings.collection_list,
            connection_string: SerializableSecretString::new(connection_string),
            batch_size: settings.batch_size,
            poll_await_time_ms: settings.poll_await_time_ms,
            poll_max_batch_size: settings.poll_max_batch_size,
            update_lookup: settings.update_lookup,
            startup_options: settings.startup_options,
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            split_meta_group_size: settings.split_meta_group_size,
            split_size_mb: settings.split_size_mb,
            include_schema_changes: settings.include_schema_changes,
            metric_identifier: settings.metric_identifier,
            audit_identifier: settings.audit_identifier,
            pool_id,
        })
    }
}

impl Default for MongoDbSourceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the `mongodb://` connection string for a source.
///
/// The result is `mongodb://[username:password@]hosts[/?options]`. Credentials are
/// percent-encoded and only emitted when both are non-empty. The same inputs always
/// produce the same string.
pub fn build_connection_string(
    username: Option<&str>,
    password: Option<&str>,
    hosts: &str,
    connection_options: Option<&str>,
) -> CdcResult<String> {
    let host_list = parse_hosts(hosts)?;

    let mut connection_string = String::from(MONGODB_SCHEME);

    let username = username.filter(|username| !username.is_empty());
    let password = password.filter(|password| !password.is_empty());
    if let (Some(username), Some(password)) = (username, password) {
        connection_string.push_str(&urlencoding::encode(username));
        connection_string.push(':');
        connection_string.push_str(&urlencoding::encode(password));
        connection_string.push('@');
    }

    connection_string.push_str(&host_list.join(","));

    let options = connection_options
        .map(str::trim)
        .filter(|options| !options.is_empty());
    if let Some(options) = options {
        parse_connection_options(options)?;
        connection_string.push_str("/?");
        connection_string.push_str(options);
    }

    Ok(connection_string)
}

/// Splits and checks a comma-separated `host[:port]` list.
///
/// IPv6 addresses must be bracketed, e.g. `[::1]:27017`.
fn parse_hosts(hosts: &str) -> CdcResult<Vec<&str>> {
    if hosts.trim().is_empty() {
        return Err(ValidationError::MissingField("hosts".to_string()).into());
    }

    hosts
        .split(',')
        .map(str::trim)
        .map(|host| check_host(host).map(|()| host))
        .collect()
}

fn check_host(host: &str) -> CdcResult<()> {
    if host.is_empty() {
        bail!(
            ErrorKind::ConfigError,
            "Invalid MongoDB hosts",
            "`hosts` contains an empty entry"
        );
    }

    if host.contains(['/', '?', '@', ' ']) {
        bail!(
            ErrorKind::ConfigError,
            "Invalid MongoDB hosts",
            format!("`hosts` entry `{host}` contains a reserved character")
        );
    }

    let port = if let Some(bracketed) = host.strip_prefix('[') {
        let Some((address, rest)) = bracketed.split_once(']') else {
            bail!(
                ErrorKind::ConfigError,
                "Invalid MongoDB hosts",
                format!("`hosts` entry `{host}` has an unterminated IPv6 address")
            );
        };
        if address.is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "Invalid MongoDB hosts",
                format!("`hosts` entry `{host}` has an empty address")
            );
        }
        match rest {
            "" => None,
            rest => match rest.strip_prefix(':') {
                Some(port) => Some(port),
                None => bail!(
                    ErrorKind::ConfigError,
                    "Invalid MongoDB hosts",
                    format!("`hosts` entry `{host}` has trailing characters")
                ),
            },
        }
    } else {
        match host.split_once(':') {
            Some((name, port)) => {
                if name.is_empty() || port.contains(':') {
                    bail!(
                        ErrorKind::ConfigError,
                        "Invalid MongoDB hosts",
                        format!("`hosts` entry `{host}` is not a valid host[:port]")
                    );
                }
                Some(port)
            }
            None => None,
        }
    };

    if port.is_some_and(|port| port.parse::<u16>().is_err()) {
        bail!(
            ErrorKind::ConfigError,
            "Invalid MongoDB hosts",
            format!("`hosts` entry `{host}` has an invalid port")
        );
    }

    Ok(())
}

/// Parses `key=value&key=value` connection options.
///
/// Keys are lower-cased since MongoDB treats option names case-insensitively.
fn parse_connection_options(options: &str) -> CdcResult<BTreeMap<String, String>> {
    let mut parsed = BTreeMap::new();

    for option in options.trim().split('&').filter(|option| !option.is_empty()) {
        let Some((key, value)) = option.split_once('=') else {
            bail!(
                ErrorKind::ConfigError,
                "Invalid MongoDB connection options",
                format!("`connection_options` entry `{option}` is not a key=value pair")
            );
        };

        let key = key.trim();
        if key.is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "Invalid MongoDB connection options",
                format!("`connection_options` entry `{option}` has an empty key")
            );
        }

        parsed.insert(key.to_lowercase(), value.trim().to_owned());
    }

    Ok(parsed)
}
