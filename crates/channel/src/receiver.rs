//! Receiver engine.
//!
//! Binds a TCP listener and drains one transfer session per accepted
//! connection: a loop of frame + payload, ended by the sender closing
//! the stream. Filenames from the wire are reduced to a bare basename
//! before any file is created, so a hostile sender cannot write
//! outside the destination directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::TCP_BUFFER_SIZE;
use crate::error::TransferError;
use crate::progress::TransferEvent;
use crate::wire::{CopyError, copy_exact, read_frame, with_timeout};

/// Summary of one completed transfer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Filenames saved, in arrival order (post-sanitization).
    pub saved: Vec<String>,
    /// Total payload bytes written.
    pub total_bytes: u64,
}

/// TCP receiver for file transfer sessions.
///
/// One listener serves any number of sequential sessions; a failed
/// session never invalidates the listener, the caller just accepts the
/// next connection.
pub struct TcpFileReceiver {
    listener: TcpListener,
    dest_dir: PathBuf,
    read_timeout: Option<Duration>,
}

impl TcpFileReceiver {
    /// Binds the listener. Received files land in `dest_dir`.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        dest_dir: PathBuf,
        read_timeout: Option<Duration>,
    ) -> Result<Self, TransferError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransferError::Connection)?;
        Ok(Self {
            listener,
            dest_dir,
            read_timeout,
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransferError> {
        self.listener.local_addr().map_err(TransferError::Connection)
    }

    /// Accepts one connection and drains a full session from it.
    ///
    /// Sessions are strictly sequential: the next connection is not
    /// accepted until this one has fully ended.
    pub async fn accept_session(
        &self,
        progress_tx: mpsc::Sender<TransferEvent>,
    ) -> Result<SessionReport, TransferError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransferError::Connection)?;
        info!(%peer, "connection accepted");
        let _ = progress_tx.send(TransferEvent::Connected { peer }).await;

        self.run_session(stream, progress_tx).await
    }

    /// Session state machine: await frame -> receive payload -> repeat,
    /// until a clean close (success) or a violation (failure).
    async fn run_session(
        &self,
        stream: TcpStream,
        progress_tx: mpsc::Sender<TransferEvent>,
    ) -> Result<SessionReport, TransferError> {
        let mut reader = BufReader::with_capacity(TCP_BUFFER_SIZE, stream);
        let mut buf = vec![0u8; TCP_BUFFER_SIZE];
        let mut saved = Vec::new();
        let mut total_bytes: u64 = 0;

        loop {
            let frame = with_timeout(self.read_timeout, read_frame(&mut reader))
                .await
                .ok_or(TransferError::Timeout)??;
            let Some(frame) = frame else {
                // Clean close between frames: end of session.
                break;
            };

            let filename = sanitize_filename(&frame.filename)?;
            if filename != frame.filename {
                warn!(
                    wire_name = %frame.filename,
                    saved_as = %filename,
                    "stripped path components from received filename"
                );
            }

            // Duplicate names within a session silently overwrite.
            let dest_path = self.dest_dir.join(&filename);
            let mut file = tokio::fs::File::create(&dest_path)
                .await
                .map_err(TransferError::FileAccess)?;

            copy_exact(&mut reader, &mut file, frame.size, &mut buf, self.read_timeout)
                .await
                .map_err(map_inbound_copy_error)?;
            file.flush().await.map_err(TransferError::FileAccess)?;
            drop(file);

            debug!(file = %filename, size = frame.size, "file received");
            let _ = progress_tx
                .send(TransferEvent::FileSaved {
                    filename: filename.clone(),
                    size: frame.size,
                })
                .await;

            total_bytes += frame.size;
            saved.push(filename);
        }

        info!(files = saved.len(), total_bytes, "session complete");
        Ok(SessionReport { saved, total_bytes })
    }
}

/// Reduces a wire filename to a bare basename.
///
/// The protocol promises basenames, but the receiver does not trust
/// the sender: both separator styles are stripped, and names that
/// leave nothing usable are a protocol error.
fn sanitize_filename(name: &str) -> Result<String, TransferError> {
    let normalized = name.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or("");
    if base.is_empty() || base == "." || base == ".." {
        return Err(TransferError::Protocol(format!(
            "unusable filename in frame: {name:?}"
        )));
    }
    Ok(base.to_string())
}

/// On the receiving side the reader is the socket and the writer is
/// the local file.
fn map_inbound_copy_error(e: CopyError) -> TransferError {
    match e {
        CopyError::Read(e) => TransferError::Connection(e),
        CopyError::Write(e) => TransferError::FileAccess(e),
        CopyError::ShortRead { outstanding } => TransferError::Protocol(format!(
            "stream closed with {outstanding} payload bytes outstanding"
        )),
        CopyError::Timeout => TransferError::Timeout,
    }
}
