//! TCP transfer channel for sending files between two hosts.
//!
//! One side listens and receives files, the other connects and streams
//! them over a single TCP connection. Each file is preceded by a small
//! binary frame carrying its name and exact byte size; the end of the
//! session is signalled by the sender closing the stream.
//!
//! # Wire format
//!
//! See the [`wire`] module for the binary protocol specification.

pub mod error;
pub mod progress;
pub mod receiver;
pub mod sender;
pub mod wire;

pub use error::TransferError;
pub use progress::TransferEvent;
pub use receiver::{SessionReport, TcpFileReceiver};
pub use sender::TcpFileSender;
pub use wire::FileFrame;

use std::time::Duration;

/// TCP read/write buffer size (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Timeout for the TCP connection attempt on the sending side.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
