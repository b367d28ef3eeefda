//! lingualink - client-side resilience core for the LinguaLink chat service
//!
//! This crate keeps a chat client talking to several redundant backend
//! deployments and to a multi-account translation provider:
//! - Backend registry with five selection strategies
//! - Active liveness probing with a fallback endpoint, plus passive
//!   tracking of request outcomes
//! - Smart keep-alive that rotates a small active set of backends
//! - A request executor with timeout, backoff and backend rotation
//! - Round-robin translation failover across provider accounts
//! - Hot configuration reload, Prometheus metrics and an admin/relay API

pub mod api;
pub mod backend;
pub mod config;
pub mod executor;
pub mod health;
pub mod keepalive;
pub mod metrics;
pub mod state;
pub mod stats;
pub mod translation;
pub mod transport;
pub mod util;

pub use config::Config;
pub use state::AppState;
