//! Metrics collection.

mod collector;

pub use collector::{CheckResult, MetricsCollector, ProbeEndpoint, RequestOutcome};
