use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Session settings applied to every PostgreSQL source connection.
///
/// Change decoding relies on stable text output for dates, intervals and floats, so
/// these are pinned regardless of the server defaults.
pub struct DefaultPgConnectionOptions;

impl DefaultPgConnectionOptions {
    /// Name reported in `pg_stat_activity` for source connections.
    pub const APPLICATION_NAME: &'static str = "cdc_source";

    /// Returns the session settings as `(name, value)` pairs.
    pub fn to_key_value_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("datestyle", "ISO"),
            ("intervalstyle", "postgres"),
            ("extra_float_digits", "3"),
            ("client_encoding", "UTF8"),
        ]
    }
}

/// Connection parameters of a PostgreSQL source database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the server.
    pub host: String,
    pub port: u16,
    /// Database to connect to.
    pub name: String,
    pub username: String,
    /// Redacted in debug output.
    pub password: Option<SerializableSecretString>,
    pub tls: TlsConfig,
}

/// TLS settings of a PostgreSQL connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    /// Fails with [`ValidationError::MissingTrustedRootCerts`] when TLS is enabled
    /// without root certificates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

impl PgConnectionConfig {
    /// Checks that the fields identifying the database are set and that TLS is usable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField("host".to_string()));
        }

        if self.port == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "port".to_string(),
                constraint: "must be between 1 and 65535".to_string(),
            });
        }

        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }

        self.tls.validate()
    }
}

/// Converts connection settings into a driver specific connect options type.
pub trait IntoConnectOptions<Output> {
    /// Options for connecting to the server without selecting a database.
    fn without_db(&self) -> Output;

    /// Options for connecting to the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };

        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .ssl_mode(ssl_mode)
            .application_name(DefaultPgConnectionOptions::APPLICATION_NAME)
            .options(DefaultPgConnectionOptions::to_key_value_pairs());

        if self.tls.enabled {
            let root_certs = self.tls.trusted_root_certs.clone().into_bytes();
            options = options.ssl_root_cert_from_pem(root_certs);
        }

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}
