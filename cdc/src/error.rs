//! Error types for source configuration and connection pool management.
//!
//! [`CdcError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, the originating error and the callsite where it was raised. Errors are
//! cheap to clone so a single failed pool creation can be handed to every task that was
//! waiting on it.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use cdc_config::shared::ValidationError;

/// Result type used across the crate.
pub type CdcResult<T> = Result<T, CdcError>;

/// Classification of a [`CdcError`].
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration
    ConfigError,
    ValidationError,

    // Connection
    SourceConnectionFailed,
    AuthenticationError,
    ConnectionPoolCreationPanic,
    ConnectionPoolCreationCancelled,

    // State
    InvalidState,

    // IO
    IoError,

    Unknown,
}

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Error raised by source configuration and connection pool operations.
#[derive(Debug, Clone)]
pub struct CdcError {
    payload: Box<ErrorPayload>,
}

impl CdcError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description.
    pub fn description(&self) -> &str {
        &self.payload.description
    }

    /// Returns the dynamic detail, such as the offending field or the driver message.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the callsite that created this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Attaches the error that caused this one.
    ///
    /// The source is shared between clones and returned by [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        CdcError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for CdcError {
    /// Errors compare by kind only; detail and location vary between occurrences.
    fn eq(&self, other: &CdcError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for CdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            if detail.trim().is_empty() {
                write!(f, "\n  Detail: <empty>")?;
            } else {
                write!(f, "\n  Detail:")?;
                for line in detail.lines() {
                    write!(f, "\n    {line}")?;
                }
            }
        }

        let backtrace = payload.backtrace.to_string();
        if !backtrace.trim().is_empty() {
            write!(f, "\n  Backtrace:")?;
            for line in backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for CdcError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for CdcError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for CdcError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<std::io::Error> for CdcError {
    #[track_caller]
    fn from(err: std::io::Error) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps settings validation failures to [`ErrorKind::ConfigError`], keeping the field
/// name in the detail.
impl From<ValidationError> for CdcError {
    #[track_caller]
    fn from(err: ValidationError) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid source configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] raised while establishing connections.
///
/// Authentication failures (SQLSTATE class `28`) are reported as
/// [`ErrorKind::AuthenticationError`]; everything else means the source could not be
/// reached and becomes [`ErrorKind::SourceConnectionFailed`].
impl From<sqlx::Error> for CdcError {
    #[track_caller]
    fn from(err: sqlx::Error) -> CdcError {
        let is_auth_failure = match &err {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .is_some_and(|code| code.starts_with("28")),
            _ => false,
        };

        let (kind, description) = if is_auth_failure {
            (ErrorKind::AuthenticationError, "PostgreSQL authentication failed")
        } else {
            (ErrorKind::SourceConnectionFailed, "PostgreSQL connection failed")
        };

        let detail = err.to_string();
        CdcError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, cdc_error};

    #[test]
    fn test_detail_and_kind() {
        let err = cdc_error!(ErrorKind::ConfigError, "Missing field", "hosts");

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(err.description(), "Missing field");
        assert_eq!(err.detail(), Some("hosts"));
    }

    #[test]
    fn test_source_is_preserved_across_clones() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = cdc_error!(
            ErrorKind::SourceConnectionFailed,
            "Pool creation failed",
            source: io_err
        );
        let cloned = err.clone();

        let source = error::Error::source(&cloned).unwrap();
        assert_eq!(source.to_string(), "refused");
    }

    #[test]
    fn test_validation_error_names_field() {
        let err: CdcError = ValidationError::MissingField("hosts".to_string()).into();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.detail().unwrap().contains("hosts"));
        assert!(err.to_string().contains("Invalid source configuration"));
    }

    #[test]
    fn test_location_points_at_callsite() {
        let err = cdc_error!(ErrorKind::InvalidState, "Unexpected state");

        assert_eq!(err.location().file(), file!());
    }

    #[test]
    fn test_detail_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = cdc_error!(
            ErrorKind::SourceConnectionFailed,
            "Pool creation failed",
            format!("host {} unreachable", "db1"),
            source: io_err,
        );

        assert_eq!(err.detail(), Some("host db1 unreachable"));
        assert!(error::Error::source(&err).is_some());
    }

    #[test]
    fn test_bail_returns_error() {
        fn check(port: u32) -> CdcResult<u16> {
            if port > u32::from(u16::MAX) {
                bail!(ErrorKind::ConfigError, "Port out of range", port.to_string());
            }

            Ok(port as u16)
        }

        assert_eq!(check(27017).unwrap(), 27017);
        let err = check(70000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(err.detail(), Some("70000"));
    }
}
