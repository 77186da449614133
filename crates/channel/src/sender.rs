//! Sender engine.
//!
//! Connects to a listening receiver and streams each input file in
//! order: one frame, then the exact payload bytes. Closing the stream
//! after the last file is what tells the receiver the session is over.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::TransferError;
use crate::progress::TransferEvent;
use crate::wire::{CopyError, FileFrame, copy_exact, write_frame};
use crate::{TCP_BUFFER_SIZE, TCP_CONNECT_TIMEOUT};

/// TCP sender for file transfer sessions.
pub struct TcpFileSender;

impl TcpFileSender {
    /// Connects to the receiver and streams all `files` in order.
    ///
    /// Any failure aborts the whole session immediately; there are no
    /// retries and no partial-file resend. Returns the total payload
    /// bytes sent.
    pub async fn connect_and_send<A: ToSocketAddrs>(
        addr: A,
        files: &[PathBuf],
        read_timeout: Option<Duration>,
        progress_tx: mpsc::Sender<TransferEvent>,
    ) -> Result<u64, TransferError> {
        let stream = match tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(addr)).await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(TransferError::Connection(e)),
            Err(_) => return Err(TransferError::Timeout),
        };
        let peer = stream.peer_addr().map_err(TransferError::Connection)?;
        info!(%peer, "connected");
        let _ = progress_tx.send(TransferEvent::Connected { peer }).await;

        let mut writer = BufWriter::with_capacity(TCP_BUFFER_SIZE, stream);
        let mut buf = vec![0u8; TCP_BUFFER_SIZE];
        let mut total_bytes: u64 = 0;

        for path in files {
            let filename = basename(path)?;

            let mut file = tokio::fs::File::open(path)
                .await
                .map_err(TransferError::FileAccess)?;
            let size = file
                .metadata()
                .await
                .map_err(TransferError::FileAccess)?
                .len();

            let _ = progress_tx
                .send(TransferEvent::SendStarted {
                    filename: filename.clone(),
                    size,
                })
                .await;

            write_frame(
                &mut writer,
                &FileFrame {
                    filename: filename.clone(),
                    size,
                },
            )
            .await?;

            copy_exact(&mut file, &mut writer, size, &mut buf, read_timeout)
                .await
                .map_err(map_outbound_copy_error)?;
            total_bytes += size;

            debug!(file = %filename, size, "file sent");
            let _ = progress_tx.send(TransferEvent::FileSent { filename }).await;
        }

        // Flush and close: the shutdown is the end-of-session signal.
        writer.flush().await.map_err(TransferError::Connection)?;
        writer
            .into_inner()
            .shutdown()
            .await
            .map_err(TransferError::Connection)?;

        info!(files = files.len(), total_bytes, "all files sent");
        Ok(total_bytes)
    }
}

/// Extracts the basename sent on the wire; directory components of the
/// local path never leave this host.
fn basename(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            TransferError::FileAccess(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path has no filename: {}", path.display()),
            ))
        })
}

/// On the sending side the reader is the local file and the writer is
/// the socket.
fn map_outbound_copy_error(e: CopyError) -> TransferError {
    match e {
        CopyError::Read(e) => TransferError::FileAccess(e),
        CopyError::Write(e) => TransferError::Connection(e),
        // The file shrank after its size was declared on the wire.
        CopyError::ShortRead { outstanding } => TransferError::Protocol(format!(
            "local file ended with {outstanding} declared bytes unsent"
        )),
        CopyError::Timeout => TransferError::Timeout,
    }
}
