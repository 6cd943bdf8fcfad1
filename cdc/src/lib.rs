//! Connection pools and source configurations for change data capture connectors.
//!
//! A job builds one immutable source configuration (e.g.
//! [`source::mongodb::MongoDbSourceConfig`]) and derives a
//! [`connection::ConnectionPoolId`] from it. Every read task then asks a
//! [`connection::ConnectionPools`] implementation for the pool of that id; the pool is
//! built once and shared by all of them.

pub mod connection;
pub mod error;
mod macros;
pub mod metrics;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
