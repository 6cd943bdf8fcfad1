//! Source configurations and the capabilities the connector engine reads from them.

mod base;
pub mod mongodb;
pub mod postgres;

pub use base::{MetricConfig, SourceConfig};
pub use cdc_config::shared::{StartupMode, StartupOptions};
