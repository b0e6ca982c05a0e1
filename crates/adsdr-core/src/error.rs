//! Error types for adsdr.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Connection, transport, and API-misuse
//! errors are captured here.
//!
//! Not everything that can go wrong is an [`Error`]. Per-command outcomes
//! such as a missing parameter or a rejected run-state transition travel
//! inside a [`Response`](crate::command::Response) as a
//! [`CommandStatus`](crate::command::CommandStatus). Transient transfer
//! failures and queue overflow/underrun on the streaming path are only
//! logged and counted.

/// The error type for all adsdr operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device could not be found, opened, or claimed.
    ///
    /// Fatal to construction; never retried by the library.
    #[error("connection error: {0}")]
    Connection(String),

    /// The USB transport rejected a submission, cancellation, or control
    /// request.
    #[error("device I/O error: {0}")]
    DeviceIo(String),

    /// The transport has no record of the transfer being cancelled.
    ///
    /// Returned when cancelling a transfer that is not in flight. The
    /// transfer pool treats this as a successful (idempotent) cancel.
    #[error("transfer not found")]
    TransferNotFound,

    /// A raw command identifier outside the dispatch table.
    #[error("unknown command identifier: {0}")]
    UnknownCommand(u8),

    /// An invalid parameter was passed to a library call.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The transceiver hardware API failed to complete a request.
    #[error("transceiver error: {0}")]
    Transceiver(String),

    /// The device handle has been closed.
    #[error("not connected")]
    NotConnected,

    /// A sample stream was closed unexpectedly.
    ///
    /// This occurs when the I/O worker has exited, or when the receiving
    /// half of a sample channel is dropped.
    #[error("stream closed")]
    StreamClosed,

    /// Timed out waiting for the device or the I/O worker.
    #[error("timeout waiting for response")]
    Timeout,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
