//! Helpers for testing code that depends on connection pools.

pub mod pool;
