//! Error types for the transfer channel.

/// Errors produced by the transfer channel.
///
/// None of these is retried: the protocol has no resumption concept, so
/// any failure discards the in-progress file and ends the session.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The connection could not be established, or the socket failed
    /// mid-session.
    #[error("connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// A local file could not be opened, created, read or written.
    #[error("file access error: {0}")]
    FileAccess(#[source] std::io::Error),

    /// The peer violated the wire protocol: a frame was malformed, the
    /// stream closed mid-frame, or a payload was shorter than declared.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The configured timeout elapsed while awaiting stream data.
    #[error("timed out waiting for stream data")]
    Timeout,
}
