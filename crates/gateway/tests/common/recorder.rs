//! Completion-handler fixtures shared by the protocol tests.

use futures::future::BoxFuture;
use muster_gateway::{GatewayError, GatewayResult};
use std::sync::{Arc, Mutex};

/// Records every completion-handler invocation with its context.
#[derive(Clone, Default)]
pub struct CompletionRecorder {
    calls: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl CompletionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, context: String) {
        self.calls.lock().unwrap().push(context);
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn contexts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// Handler that records the context and succeeds.
#[allow(dead_code)]
pub fn recording_handler(
    recorder: &CompletionRecorder,
) -> impl FnOnce(String) -> BoxFuture<'static, GatewayResult<()>> + use<> {
    let recorder = recorder.clone();
    move |context| {
        Box::pin(async move {
            recorder.record(context);
            Ok(())
        })
    }
}

/// Handler that fails after recording nothing.
#[allow(dead_code)]
pub fn failing_handler() -> impl FnOnce(String) -> BoxFuture<'static, GatewayResult<()>> {
    |_context| {
        Box::pin(async {
            Err(GatewayError::handler(std::io::Error::other(
                "handler exploded",
            )))
        })
    }
}
