//! Logging setup for processes embedding the CDC source crates.

pub mod tracing;
