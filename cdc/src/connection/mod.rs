//! Connection pool identities and the keyed pool cache.

mod pool_id;
mod pools;
pub mod postgres;

pub use pool_id::ConnectionPoolId;
pub use pools::{ConnectionPoolFactory, ConnectionPools, KeyedConnectionPools};
