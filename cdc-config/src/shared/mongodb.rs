use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;
use crate::load::Config;
use crate::shared::{StartupOptions, ValidationError};

/// Raw parameters of a MongoDB change stream source, as supplied by the job.
///
/// Everything except `hosts` has a default. Tuning values are taken as given: zero
/// is a legal value for every numeric field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MongoDbSourceSettings {
    /// Comma-separated `host[:port]` list, e.g. `db1:27017,db2:27017`.
    #[serde(default)]
    pub hosts: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SerializableSecretString>,
    /// Databases to capture. `None` captures every database.
    #[serde(default)]
    pub database_list: Option<Vec<String>>,
    /// Collections to capture, as `database.collection`. `None` captures every collection.
    #[serde(default)]
    pub collection_list: Option<Vec<String>>,
    /// Free-form `key=value&key=value` options appended to the connection string.
    #[serde(default)]
    pub connection_options: Option<String>,
    /// Cursor batch size used while snapshotting.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// How long a change stream poll waits for new changes.
    #[serde(default = "default_poll_await_time_ms")]
    pub poll_await_time_ms: u32,
    /// Maximum number of change events returned by one poll.
    #[serde(default = "default_poll_max_batch_size")]
    pub poll_max_batch_size: u32,
    /// Whether update events carry the full document instead of a delta.
    #[serde(default = "default_update_lookup")]
    pub update_lookup: bool,
    /// Interval between heartbeat events; `0` disables heartbeats.
    #[serde(default)]
    pub heartbeat_interval_ms: u32,
    #[serde(default = "default_split_meta_group_size")]
    pub split_meta_group_size: u32,
    #[serde(default = "default_split_size_mb")]
    pub split_size_mb: u32,
    #[serde(default)]
    pub include_schema_changes: bool,
    #[serde(default)]
    pub startup_options: StartupOptions,
    /// Namespace under which source metrics are reported.
    #[serde(default)]
    pub metric_identifier: Option<String>,
    /// Identifier of the audit stream fed by this source.
    #[serde(default)]
    pub audit_identifier: Option<String>,
}

impl MongoDbSourceSettings {
    pub const DEFAULT_BATCH_SIZE: u32 = 1024;

    pub const DEFAULT_POLL_AWAIT_TIME_MS: u32 = 1000;

    pub const DEFAULT_POLL_MAX_BATCH_SIZE: u32 = 1024;

    pub const DEFAULT_UPDATE_LOOKUP: bool = true;

    pub const DEFAULT_SPLIT_META_GROUP_SIZE: u32 = 1000;

    pub const DEFAULT_SPLIT_SIZE_MB: u32 = 64;

    /// Checks the fields that cannot be defaulted.
    ///
    /// Only presence is checked here. The host list itself is parsed when the
    /// connection string is derived.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.hosts.as_deref() {
            Some(hosts) if !hosts.trim().is_empty() => Ok(()),
            _ => Err(ValidationError::MissingField("hosts".to_string())),
        }
    }
}

impl Default for MongoDbSourceSettings {
    fn default() -> Self {
        Self {
            hosts: None,
            username: None,
            password: None,
            database_list: None,
            collection_list: None,
            connection_options: None,
            batch_size: default_batch_size(),
            poll_await_time_ms: default_poll_await_time_ms(),
            poll_max_batch_size: default_poll_max_batch_size(),
            update_lookup: default_update_lookup(),
            heartbeat_interval_ms: 0,
            split_meta_group_size: default_split_meta_group_size(),
            split_size_mb: default_split_size_mb(),
            include_schema_changes: false,
            startup_options: StartupOptions::default(),
            metric_identifier: None,
            audit_identifier: None,
        }
    }
}

impl Config for MongoDbSourceSettings {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["database_list", "collection_list"];
}

fn default_batch_size() -> u32 {
    MongoDbSourceSettings::DEFAULT_BATCH_SIZE
}

fn default_poll_await_time_ms() -> u32 {
    MongoDbSourceSettings::DEFAULT_POLL_AWAIT_TIME_MS
}

fn default_poll_max_batch_size() -> u32 {
    MongoDbSourceSettings::DEFAULT_POLL_MAX_BATCH_SIZE
}

fn default_update_lookup() -> bool {
    MongoDbSourceSettings::DEFAULT_UPDATE_LOOKUP
}

fn default_split_meta_group_size() -> u32 {
    MongoDbSourceSettings::DEFAULT_SPLIT_META_GROUP_SIZE
}

fn default_split_size_mb() -> u32 {
    MongoDbSourceSettings::DEFAULT_SPLIT_SIZE_MB
}
