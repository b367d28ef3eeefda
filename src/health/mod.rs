//! Health tracking and liveness probing for backends.

mod passive;
mod prober;
mod state;

pub use passive::{FailureClass, PassiveHealthTracker};
pub use prober::{HealthProber, ProbeConfig};
pub use state::{HealthConfig, HealthRecord, HealthState};
