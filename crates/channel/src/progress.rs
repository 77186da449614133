//! Per-file progress events delivered to the driving application.

use std::net::SocketAddr;

/// Notifications emitted by the sender and receiver engines over an
/// `mpsc` channel. The CLI turns these into user-facing output; the
/// engines never block a transfer on a slow consumer beyond the
/// channel's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A connection was established (sender side) or accepted
    /// (receiver side).
    Connected { peer: SocketAddr },

    /// The sender started streaming a file.
    SendStarted { filename: String, size: u64 },

    /// The sender finished streaming a file.
    FileSent { filename: String },

    /// The receiver wrote a complete file to the destination directory.
    FileSaved { filename: String, size: u64 },
}
