//! Shared building blocks for the counting orchestration services.
//!
//! - [`config`]: environment-driven configuration lookup
//! - [`errors`]: the application error type and its HTTP mapping
//! - [`middleware`]: request-id propagation
//! - [`models`]: count payloads exchanged between services
//! - [`response`]: the JSON response envelope
//! - [`telemetry`]: tracing subscriber bootstrap

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod telemetry;
