//! Settings shared between connector jobs.

mod connection;
mod mongodb;
mod startup;
mod validation;

pub use connection::{
    DefaultPgConnectionOptions, IntoConnectOptions, PgConnectionConfig, TlsConfig,
};
pub use mongodb::MongoDbSourceSettings;
pub use startup::{StartupMode, StartupOptions};
pub use validation::ValidationError;
