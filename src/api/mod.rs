//! Admin and relay HTTP API.

mod routes;
mod server;

pub use routes::{handle_request, Route};
pub use server::ApiServer;
