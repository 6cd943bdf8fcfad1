use std::fmt;

use cdc_config::shared::StartupOptions;

/// Capability every engine specific source configuration exposes to the engine.
///
/// Split assignment and offset resumption only need these answers, so they can run
/// against any source without knowing the concrete configuration type.
///
/// Implementations are immutable values shared by every parallel read task of a job;
/// all methods are plain accessors.
pub trait SourceConfig: fmt::Debug + Send + Sync {
    /// Returns where reading starts when the job has no restored state.
    fn startup_options(&self) -> &StartupOptions;

    /// Returns the target size of a snapshot split, in megabytes.
    fn split_size(&self) -> u32;

    /// Returns how many split descriptors are grouped into one metadata message.
    fn split_meta_group_size(&self) -> u32;

    /// Returns whether schema change events are emitted along with data changes.
    fn include_schema_changes(&self) -> bool;
}

/// Capability describing how a source reports metrics and audit data.
///
/// Keeps metric emission independent of engine specific field names.
pub trait MetricConfig {
    /// Returns the namespace under which metrics for this source are reported.
    fn metric_identifier(&self) -> Option<&str>;

    /// Returns the identifier of the audit stream fed by this source.
    fn audit_identifier(&self) -> Option<&str>;

    /// Returns the ordered label names attached to every metric sample.
    fn metric_labels(&self) -> &'static [&'static str];
}
