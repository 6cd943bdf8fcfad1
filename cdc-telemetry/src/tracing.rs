use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Environment variable that turns on log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors returned by [`init_tracing`].
pub type TracingInitError = tracing_subscriber::util::TryInitError;

/// Installs the global subscriber for a connector process.
///
/// Log lines carry the `service` name as a field on a root span so that output from
/// several embedded sources can be told apart. The filter comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init_tracing(service: &str) -> Result<::tracing::span::EnteredSpan, TracingInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    Ok(::tracing::info_span!("service", name = %service).entered())
}

/// Installs a test writer subscriber once per test binary.
///
/// Does nothing unless `ENABLE_TRACING` is set, keeping test output quiet by default.
pub fn init_test_tracing() {
    if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
