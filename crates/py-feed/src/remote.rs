//! Deadline wrapper for every suspension point against a port.

use std::future::Future;
use std::time::Duration;

use py_core::{AppError, Result};

/// Whether a remote call reads or writes, which decides the error it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Read,
    Write,
}

impl RemoteOp {
    fn failed(self, reason: String) -> AppError {
        match self {
            RemoteOp::Read => AppError::RemoteReadFailed(reason),
            RemoteOp::Write => AppError::RemoteWriteFailed(reason),
        }
    }
}

/// Awaits `fut` for at most `limit`. Adapter errors and timeouts both surface
/// as `RemoteReadFailed`/`RemoteWriteFailed` naming `what`.
pub async fn bounded<T, F>(limit: Duration, op: RemoteOp, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(op.failed(format!("{what}: {err:#}"))),
        Err(_) => Err(op.failed(format!("{what}: timed out after {}ms", limit.as_millis()))),
    }
}
