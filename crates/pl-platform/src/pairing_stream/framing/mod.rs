//! Length-delimited framing helpers for pairing streams.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

/// Maximum frame size accepted on pairing streams (16 KiB).
pub const MAX_PAIRING_FRAME_BYTES: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame io error: {0}")]
    Io(#[from] io::Error),

    #[error("frame exceeds max: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error("frame is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write a length-prefixed payload (u32 big-endian length, then the bytes).
pub async fn write_length_prefixed<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_PAIRING_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_PAIRING_FRAME_BYTES,
        });
    }
    let len = payload.len() as u32;

    trace!(stage = "write_len_prefix", len, "writing frame length");
    writer.write_all(&len.to_be_bytes()).await?;
    trace!(stage = "write_payload", len, "writing frame payload");
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a single length-prefixed frame enforcing an upper bound.
///
/// Returns `Ok(None)` if the stream ends cleanly before the length prefix,
/// which is what a bare reachability probe looks like.
pub async fn read_length_prefixed<R>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let n = reader.read(&mut len_buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if n < 4 {
        if let Err(e) = reader.read_exact(&mut len_buf[n..]).await {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                warn!(stage = "read_len_prefix", error = %e, read = n, "unexpected eof reading length");
            }
            return Err(e.into());
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_bytes {
        return Err(FrameError::TooLarge {
            len,
            max: max_frame_bytes,
        });
    }

    let mut buf = vec![0u8; len];
    trace!(stage = "read_payload", len, "reading frame payload");
    if let Err(e) = reader.read_exact(&mut buf).await {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            warn!(stage = "read_payload", error = %e, expected = len, "unexpected eof reading payload");
        }
        return Err(e.into());
    }
    Ok(Some(buf))
}

pub async fn write_json_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(value)?;
    write_length_prefixed(writer, &bytes).await
}

pub async fn read_json_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_length_prefixed(reader, MAX_PAIRING_FRAME_BYTES).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
