//! Error types for the session manager
//! Every public operation returns one of these kinds; nothing panics
//! and no transport failure is silently folded into a default value.

use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum BleError {
    /// The platform has no usable BLE stack at all. Reported once at
    /// session initialization and fatal for the whole session.
    #[error("platform BLE stack is unavailable")]
    PlatformUnsupported,

    /// An adapter or device index was outside the current list bounds.
    #[error("index {0} is out of range")]
    InvalidIndex(usize),

    /// A scan operation was attempted before an adapter was selected,
    /// or the selection went stale after a registry refresh.
    #[error("no adapter selected")]
    NoAdapterSelected,

    /// A connect was attempted while a connection is already active.
    #[error("device is already connected")]
    AlreadyConnected,

    /// Disconnect (or a teardown-only operation) with nothing connected.
    #[error("no active connection")]
    NoActiveConnection,

    /// A GATT operation was attempted with no connected device.
    #[error("device is not connected")]
    NotConnected,

    /// An endpoint handle was outside the current endpoint list bounds.
    #[error("endpoint handle {0} is out of range")]
    InvalidHandle(usize),

    /// Subscribe on a characteristic without the notify capability.
    #[error("characteristic does not support notifications")]
    NotNotifiable,

    /// Write on a characteristic with neither write capability.
    #[error("characteristic supports neither write mode")]
    WriteNotSupported,

    /// The transport gave up waiting on the link.
    #[error("operation timed out")]
    Timeout,

    /// Catch-all for failures inside the underlying BLE stack.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] anyhow::Error),
}

impl BleError {
    /// Wraps an arbitrary transport-side error message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportFailure(anyhow::anyhow!(msg.into()))
    }
}
