//! Metric names and labels reported by CDC sources.

use metrics::Label;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::source::MetricConfig;

/// Label for the database a record was read from.
pub const DATABASE_NAME_LABEL: &str = "database";

/// Label for the document collection a record was read from.
pub const COLLECTION_NAME_LABEL: &str = "collection";

/// Label for the relational schema a record was read from.
pub const SCHEMA_NAME_LABEL: &str = "schema";

/// Label for the relational table a record was read from.
pub const TABLE_NAME_LABEL: &str = "table";

/// Label carrying the metric identifier of the source that reported a sample.
pub const SOURCE_METRIC_LABEL: &str = "source";

/// Label carrying the engine behind a connection pool.
pub const ENGINE_LABEL: &str = "engine";

// Connection pool metrics

/// Counter of connection pools created successfully.
pub const CDC_CONNECTION_POOL_CREATIONS_TOTAL: &str = "cdc_connection_pool_creations_total";

/// Counter of failed connection pool creations.
pub const CDC_CONNECTION_POOL_CREATION_FAILURES_TOTAL: &str =
    "cdc_connection_pool_creation_failures_total";

/// Histogram of connection pool creation time in seconds.
pub const CDC_CONNECTION_POOL_CREATION_DURATION_SECONDS: &str =
    "cdc_connection_pool_creation_duration_seconds";

/// Gauge of connection pools currently held by a cache.
pub const CDC_CONNECTION_POOLS_CACHED: &str = "cdc_connection_pools_cached";

/// Labels attached to every sample emitted for one source record.
///
/// Pairs the ordered label names of a [`MetricConfig`] with the values of the record,
/// e.g. the database and collection it came from, and prefixes the source's metric
/// identifier when one is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetricLabels {
    labels: Vec<Label>,
}

impl SourceMetricLabels {
    /// Builds the labels for one record.
    ///
    /// `values` must follow the order of [`MetricConfig::metric_labels`]; a length
    /// mismatch means the caller and the configuration disagree on the label layout and
    /// fails with [`ErrorKind::InvalidState`].
    pub fn new<C>(config: &C, values: &[&str]) -> CdcResult<Self>
    where
        C: MetricConfig + ?Sized,
    {
        let names = config.metric_labels();
        if names.len() != values.len() {
            bail!(
                ErrorKind::InvalidState,
                "Metric label values do not match the configured labels",
                format!("expected {} values for {:?}, got {}", names.len(), names, values.len())
            );
        }

        let mut labels = Vec::with_capacity(names.len() + 1);
        if let Some(identifier) = config.metric_identifier() {
            labels.push(Label::new(SOURCE_METRIC_LABEL, identifier.to_owned()));
        }
        labels.extend(
            names
                .iter()
                .zip(values)
                .map(|(name, value)| Label::new(*name, (*value).to_owned())),
        );

        Ok(Self { labels })
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn into_labels(self) -> Vec<Label> {
        self.labels
    }
}
