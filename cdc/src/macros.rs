//! Error construction shorthands.

/// Creates a [`crate::error::CdcError`] at the calling location.
///
/// ```ignore
/// cdc_error!(ErrorKind::ConfigError, "Invalid MongoDB hosts");
/// cdc_error!(ErrorKind::ConfigError, "Invalid MongoDB hosts", format!("bad entry `{host}`"));
/// cdc_error!(ErrorKind::SourceConnectionFailed, "Connect failed", source: io_err);
/// cdc_error!(ErrorKind::SourceConnectionFailed, "Connect failed", detail, source: io_err);
/// ```
///
/// The detail is anything convertible into `Cow<'static, str>`: a literal, a `String`
/// or a `format!` result.
#[macro_export]
macro_rules! cdc_error {
    ($kind:expr, $desc:literal $(,)?) => {
        $crate::error::CdcError::from(($kind, $desc))
    };
    ($kind:expr, $desc:literal, source: $source:expr $(,)?) => {
        $crate::cdc_error!($kind, $desc).with_source($source)
    };
    ($kind:expr, $desc:literal, $detail:expr $(,)?) => {
        $crate::error::CdcError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:literal, $detail:expr, source: $source:expr $(,)?) => {
        $crate::cdc_error!($kind, $desc, $detail).with_source($source)
    };
}

/// Returns `Err(cdc_error!(..))` from the enclosing function.
///
/// Takes the same arguments as [`cdc_error!`].
#[macro_export]
macro_rules! bail {
    ($($args:tt)+) => {
        return ::core::result::Result::Err($crate::cdc_error!($($args)+))
    };
}
