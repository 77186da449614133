//! TCP wire format for file transfers.
//!
//! # Wire format
//!
//! ```text
//! PER FILE (sender -> receiver):
//!   [4 bytes BE: filename_len]
//!   [filename_len bytes: filename UTF-8, basename only]
//!   [8 bytes BE: payload_size]
//!   [payload_size bytes: raw file data]
//!
//! END OF SESSION: sender closes the stream. There is no end marker;
//! a clean close between frames terminates the session, a close inside
//! a frame or payload is a protocol error.
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransferError;

/// Maximum filename length accepted on the wire, in bytes.
pub const MAX_FILENAME_LEN: usize = 65_535;

/// A file frame in the TCP stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFrame {
    /// Filename (UTF-8, basename only).
    pub filename: String,
    /// Total file size in bytes.
    pub size: u64,
}

/// Writes a file frame to the stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &FileFrame,
) -> Result<(), TransferError> {
    let name_bytes = frame.filename.as_bytes();
    if name_bytes.len() > MAX_FILENAME_LEN {
        return Err(TransferError::Protocol(format!(
            "filename too long: {} bytes (max {MAX_FILENAME_LEN})",
            name_bytes.len()
        )));
    }

    writer
        .write_u32(name_bytes.len() as u32)
        .await
        .map_err(TransferError::Connection)?;
    writer
        .write_all(name_bytes)
        .await
        .map_err(TransferError::Connection)?;
    writer
        .write_u64(frame.size)
        .await
        .map_err(TransferError::Connection)?;
    Ok(())
}

/// Reads a file frame from the stream.
///
/// Returns `Ok(None)` iff the stream closed cleanly before any frame
/// byte arrived, which marks the end of the session. A close anywhere
/// inside the frame is a [`TransferError::Protocol`].
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<FileFrame>, TransferError> {
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_buf).await? {
        return Ok(None);
    }

    let name_len = u32::from_be_bytes(len_buf) as usize;
    if name_len > MAX_FILENAME_LEN {
        return Err(TransferError::Protocol(format!(
            "declared filename length {name_len} exceeds maximum {MAX_FILENAME_LEN}"
        )));
    }

    let mut name_buf = vec![0u8; name_len];
    reader
        .read_exact(&mut name_buf)
        .await
        .map_err(mid_frame_error)?;
    let filename = String::from_utf8(name_buf)
        .map_err(|e| TransferError::Protocol(format!("filename is not valid UTF-8: {e}")))?;

    let mut size_buf = [0u8; 8];
    reader
        .read_exact(&mut size_buf)
        .await
        .map_err(mid_frame_error)?;

    Ok(Some(FileFrame {
        filename,
        size: u64::from_be_bytes(size_buf),
    }))
}

/// Fills `buf` completely, or reports that the stream ended before the
/// first byte.
///
/// Returns `Ok(true)` when `buf` is full, `Ok(false)` when the stream
/// closed with zero bytes read. A close after a partial fill is a
/// protocol error; the two outcomes are what lets the receiver tell a
/// clean end of session apart from a truncated one.
async fn read_exact_or_eof<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<bool, TransferError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(TransferError::Connection)?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(TransferError::Protocol(format!(
                "stream closed mid-frame ({filled} of {} header bytes)",
                buf.len()
            )));
        }
        filled += n;
    }
    Ok(true)
}

fn mid_frame_error(e: std::io::Error) -> TransferError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransferError::Protocol("stream closed mid-frame".into())
    } else {
        TransferError::Connection(e)
    }
}

/// Errors from [`copy_exact`], mapped by each engine to the right
/// [`TransferError`] variant for its direction (on the sender the
/// reader is a local file, on the receiver it is the socket).
#[derive(Debug)]
pub enum CopyError {
    /// The read side failed.
    Read(std::io::Error),
    /// The write side failed.
    Write(std::io::Error),
    /// The read side reached EOF with bytes still outstanding.
    ShortRead { outstanding: u64 },
    /// The per-chunk timeout elapsed.
    Timeout,
}

/// Copies exactly `len` bytes from `reader` to `writer` in bounded
/// chunks of `buf.len()` bytes, keeping memory use independent of file
/// size. Used for both directions: local file -> socket on the sender
/// and socket -> local file on the receiver.
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<(), CopyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut remaining = len;
    while remaining > 0 {
        let to_read = remaining.min(buf.len() as u64) as usize;
        let n = with_timeout(timeout, reader.read(&mut buf[..to_read]))
            .await
            .ok_or(CopyError::Timeout)?
            .map_err(CopyError::Read)?;
        if n == 0 {
            return Err(CopyError::ShortRead {
                outstanding: remaining,
            });
        }

        with_timeout(timeout, writer.write_all(&buf[..n]))
            .await
            .ok_or(CopyError::Timeout)?
            .map_err(CopyError::Write)?;
        remaining -= n as u64;
    }
    Ok(())
}

/// Runs `fut` under an optional deadline. `None` on elapse.
pub async fn with_timeout<F: Future>(dur: Option<Duration>, fut: F) -> Option<F::Output> {
    match dur {
        Some(d) => tokio::time::timeout(d, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip() {
        let frame = FileFrame {
            filename: "level1.bin".into(),
            size: 1_048_576,
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();
        assert_eq!(buf.len(), 4 + 10 + 8);

        let mut cursor = &buf[..];
        let parsed = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(parsed, frame);
        assert!(cursor.is_empty());
    }

    #[tokio::test]
    async fn frame_roundtrip_zero_size() {
        let frame = FileFrame {
            filename: "empty.txt".into(),
            size: 0,
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();

        let mut cursor = &buf[..];
        let parsed = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(parsed, frame);
    }

    #[tokio::test]
    async fn frame_roundtrip_empty_filename() {
        let frame = FileFrame {
            filename: String::new(),
            size: 7,
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();

        let mut cursor = &buf[..];
        let parsed = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(parsed, frame);
    }

    #[tokio::test]
    async fn frame_roundtrip_max_filename_and_size() {
        let frame = FileFrame {
            filename: "x".repeat(MAX_FILENAME_LEN),
            size: (1u64 << 63) - 1,
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();

        let mut cursor = &buf[..];
        let parsed = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(parsed, frame);
    }

    #[tokio::test]
    async fn frame_roundtrip_non_ascii_filename() {
        let frame = FileFrame {
            filename: "ärchive-🗄.tar".into(),
            size: 42,
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();

        let mut cursor = &buf[..];
        let parsed = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(parsed, frame);
    }

    #[tokio::test]
    async fn write_rejects_overlong_filename() {
        let frame = FileFrame {
            filename: "x".repeat(MAX_FILENAME_LEN + 1),
            size: 0,
        };

        let mut buf = Vec::new();
        let result = write_frame(&mut buf, &frame).await;
        assert!(matches!(result, Err(TransferError::Protocol(_))));
    }

    #[tokio::test]
    async fn clean_eof_is_end_of_session() {
        let mut cursor: &[u8] = &[];
        let result = read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn partial_length_field_is_protocol_error() {
        let mut cursor: &[u8] = &[0x00, 0x00];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(TransferError::Protocol(_))));
    }

    #[tokio::test]
    async fn truncated_filename_is_protocol_error() {
        // Declares a 10-byte filename but only 3 bytes follow.
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"abc");

        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(TransferError::Protocol(_))));
    }

    #[tokio::test]
    async fn truncated_size_field_is_protocol_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(b"a.b");
        buf.extend_from_slice(&[0x00, 0x00]); // 2 of 8 size bytes

        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(TransferError::Protocol(_))));
    }

    #[tokio::test]
    async fn oversized_declared_filename_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FILENAME_LEN as u32 + 1).to_be_bytes());

        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(TransferError::Protocol(_))));
    }

    #[tokio::test]
    async fn invalid_utf8_filename_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&[0xff, 0xfe]);
        buf.extend_from_slice(&0u64.to_be_bytes());

        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(TransferError::Protocol(_))));
    }

    #[tokio::test]
    async fn copy_exact_copies_declared_bytes() {
        let data = b"0123456789";
        let mut reader = &data[..];
        let mut out = Vec::new();
        let mut buf = [0u8; 4];

        copy_exact(&mut reader, &mut out, 10, &mut buf, None)
            .await
            .unwrap();
        assert_eq!(&out, data);
    }

    #[tokio::test]
    async fn copy_exact_stops_at_declared_length() {
        let data = b"0123456789extra";
        let mut reader = &data[..];
        let mut out = Vec::new();
        let mut buf = [0u8; 4];

        copy_exact(&mut reader, &mut out, 10, &mut buf, None)
            .await
            .unwrap();
        assert_eq!(&out, b"0123456789");
        assert_eq!(reader, b"extra");
    }

    #[tokio::test]
    async fn copy_exact_zero_length_is_noop() {
        let mut reader: &[u8] = &[];
        let mut out = Vec::new();
        let mut buf = [0u8; 4];

        copy_exact(&mut reader, &mut out, 0, &mut buf, None)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn copy_exact_detects_short_read() {
        let data = b"abc";
        let mut reader = &data[..];
        let mut out = Vec::new();
        let mut buf = [0u8; 4];

        let result = copy_exact(&mut reader, &mut out, 10, &mut buf, None).await;
        assert!(matches!(
            result,
            Err(CopyError::ShortRead { outstanding: 7 })
        ));
    }

    #[tokio::test]
    async fn copy_exact_times_out_on_stalled_reader() {
        // A duplex stream with no writer activity stalls the read side.
        let (mut stalled, _held_open) = tokio::io::duplex(64);
        let mut out = Vec::new();
        let mut buf = [0u8; 4];

        let result = copy_exact(
            &mut stalled,
            &mut out,
            10,
            &mut buf,
            Some(Duration::from_millis(20)),
        )
        .await;
        assert!(matches!(result, Err(CopyError::Timeout)));
    }
}
