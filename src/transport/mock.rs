//! Scripted transport for unit tests.

use super::{OutboundRequest, Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

type Responder =
    dyn Fn(&OutboundRequest) -> Result<TransportResponse, TransportError> + Send + Sync;

/// Answers every request with a closure and records the URLs it saw.
pub(crate) struct ScriptedTransport {
    responder: Box<Responder>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&OutboundRequest) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().push(request.url.clone());
        (self.responder)(&request)
    }
}

/// Build a response with a JSON body.
pub(crate) fn json_response(status: u16, body: &str) -> TransportResponse {
    TransportResponse {
        status,
        body: Bytes::from(body.to_string()),
    }
}
