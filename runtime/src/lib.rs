//! # Socialmart Runtime
//!
//! Execution plumbing shared by the marketplace services:
//!
//! - [`retry`]: exponential backoff for transient entity-store failures
//! - [`deadline`]: bounded execution for report queries
//! - [`metrics`]: Prometheus exporter and runtime-level metric recorders

pub mod deadline;
pub mod metrics;
pub mod retry;

pub use deadline::{DeadlineExceeded, with_deadline};
pub use retry::{RetryPolicy, retry_with_predicate};
