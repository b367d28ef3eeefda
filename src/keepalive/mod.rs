//! Smart keep-alive: keeps a small rotating subset of backends warm.

mod active_set;
mod scheduler;

pub use active_set::{ActiveSet, Rotation};
pub use scheduler::{KeepAliveScheduler, KeepAliveSettings, KeepAliveStatus};
