//! Backend registry, selection strategies and the load balancer.

mod balancer;
mod registry;
pub mod strategies;

pub use balancer::LoadBalancer;
pub use registry::{Backend, BackendId, BackendRegistry, RegistryError};
