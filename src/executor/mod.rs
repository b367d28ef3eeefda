//! Resilient request execution across backends.

mod request;
mod retry;

pub use request::{ExecuteError, RequestExecutor, RequestOptions};
pub use retry::{backoff_delay, RetryPolicy};
