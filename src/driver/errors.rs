//! Driver error types

use thiserror::Error;

/// Errors surfaced by a browser driver implementation.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Input dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Transport-level failures worth retrying with backoff. Everything else
    /// is terminal for the attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::NavigationFailed(_) | DriverError::Timeout(_) | DriverError::ConnectionLost(_)
        )
    }
}
