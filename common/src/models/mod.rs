//! Shared data models for the counting services.

pub mod count;

pub use count::{AggregateResult, CountResult, TIMESTAMP_FORMAT};
