//! Scripted runtimes for executor tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use flowscript::errors::ExecutionError;
use flowscript::registry::{ExecutionParams, NodeRuntime};

/// Returns a fixed value.
pub struct StaticSource(pub Value);

#[async_trait]
impl NodeRuntime for StaticSource {
    async fn execute(&self, _params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        Ok(self.0.clone())
    }
}

/// Returns its input unchanged (and `null` when unwired).
pub struct EchoRuntime;

#[async_trait]
impl NodeRuntime for EchoRuntime {
    async fn execute(&self, params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        Ok(params.input.unwrap_or(Value::Null))
    }
}

/// Fails every call with the given HTTP status.
pub struct FailingRuntime(pub u16);

#[async_trait]
impl NodeRuntime for FailingRuntime {
    async fn execute(&self, _params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        Err(ExecutionError::Http {
            status: self.0,
            body: None,
        })
    }
}

/// Fails the first `fail_times` calls with an HTTP status, then succeeds
/// with the payload. Tracks the attempt count.
pub struct FlakyRuntime {
    pub fail_times: u32,
    pub status: u16,
    pub payload: Value,
    pub calls: Arc<AtomicU32>,
}

impl FlakyRuntime {
    pub fn new(fail_times: u32, status: u16, payload: Value) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                fail_times,
                status,
                payload,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl NodeRuntime for FlakyRuntime {
    async fn execute(&self, _params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            Err(ExecutionError::Http {
                status: self.status,
                body: None,
            })
        } else {
            Ok(self.payload.clone())
        }
    }
}

/// Sleeps until cancelled; never completes on its own.
pub struct HangingRuntime;

#[async_trait]
impl NodeRuntime for HangingRuntime {
    async fn execute(&self, params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        params.cancel.cancelled().await;
        Err(ExecutionError::Abort)
    }
}
