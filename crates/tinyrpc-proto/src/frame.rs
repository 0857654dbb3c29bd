//! Length-prefixed frame I/O.
//!
//! A frame is an unsigned varint byte-length followed by that many raw
//! bytes; an empty frame is a single zero byte. Every logical unit on the
//! wire - one header, one body - is exactly one frame, and framing is
//! agnostic to which it carries.
//!
//! Transient transport interruptions are retried at this layer; every other
//! I/O failure is fatal to the stream. Declared lengths are checked against
//! a cap before any allocation happens.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{ProtocolError, Result};
use crate::wire;

/// Largest frame a header may occupy.
///
/// A header is a handful of varints plus a method or error string; a bigger
/// declaration is a corrupt or hostile stream.
pub const MAX_HEADER_FRAME_LEN: u64 = 1024;

/// Largest frame a body may occupy (16 MiB).
pub const MAX_BODY_FRAME_LEN: u64 = 16 * 1024 * 1024;

/// Write one frame: the varint length, then the bytes.
///
/// The caller owns buffering and flushing.
pub async fn send_frame<W>(w: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut prefix = Vec::with_capacity(wire::MAX_VARINT_LEN);
    wire::put_uvarint(&mut prefix, data.len() as u64);
    write_full(w, &prefix).await?;
    if !data.is_empty() {
        write_full(w, data).await?;
    }
    Ok(())
}

/// Read one frame, rejecting declared lengths above `max_len`.
///
/// An empty frame yields an empty buffer.
pub async fn recv_frame<R>(r: &mut R, max_len: u64) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let size = read_uvarint(r).await?;
    if size > max_len {
        return Err(ProtocolError::FrameTooLarge { size, max: max_len });
    }
    let mut data = vec![0u8; size as usize];
    if size != 0 {
        read_full(r, &mut data).await?;
    }
    Ok(data)
}

/// Write all of `data`, retrying transient interruptions.
async fn write_full<W>(w: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut index = 0;
    while index < data.len() {
        match w.write(&data[index..]).await {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => index += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Fill `data`, retrying transient interruptions.
async fn read_full<R>(r: &mut R, data: &mut [u8]) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut index = 0;
    while index < data.len() {
        match r.read(&mut data[index..]).await {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => index += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read one varint length prefix, a byte at a time.
async fn read_uvarint<R>(r: &mut R) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for i in 0..wire::MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        read_full(r, &mut byte).await?;
        let byte = byte[0];
        if i == wire::MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(ProtocolError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(ProtocolError::VarintOverflow)
}
