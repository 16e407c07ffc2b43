//! Media acquisition error taxonomy.

use thiserror::Error;

/// Result type alias for media operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Failures surfaced while acquiring local media.
///
/// Acquisition errors are not retried by the core; retry is a caller-level
/// decision. [`MediaError::ScreenShareCancelled`] is not an error condition
/// for the session; the coordinator treats it as a no-op.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The user denied the permission prompt.
    #[error("permission to use the {device} was denied")]
    PermissionDenied { device: &'static str },

    /// No matching capture device exists on this host.
    #[error("no {device} device was found")]
    DeviceNotFound { device: &'static str },

    /// The device exists but another application holds it.
    #[error("the {device} is in use by another application")]
    DeviceInUse { device: &'static str },

    /// The host environment cannot capture the screen.
    #[error("screen capture is not supported in this environment")]
    NotSupported,

    /// The user dismissed the screen picker. Not a session failure.
    #[error("screen selection was cancelled")]
    ScreenShareCancelled,
}

impl MediaError {
    /// Whether the call can proceed at all after this error. Cancelling the
    /// screen picker leaves the session exactly as it was.
    pub fn is_fatal_to_call(&self) -> bool {
        !matches!(self, Self::ScreenShareCancelled)
    }
}
