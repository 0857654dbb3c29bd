//! Pluggable body compression.
//!
//! Every body on the wire passes through a [`Compressor`] selected per
//! call and named in the header. The registry is closed over
//! [`CompressType`]; adding an algorithm extends the enum without touching
//! the header format.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

use crate::errors::{ProtocolError, Result};

/// Compression algorithm applied to a request or response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressType {
    /// Identity transform.
    #[default]
    Raw,
    /// RFC 1952 gzip stream.
    Gzip,
    /// Snappy stream (framing) format.
    Snappy,
    /// RFC 1950 zlib stream.
    Zlib,
}

impl CompressType {
    /// Decode a wire value. `None` if the registry does not know it.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Raw),
            1 => Some(Self::Gzip),
            2 => Some(Self::Snappy),
            3 => Some(Self::Zlib),
            _ => None,
        }
    }

    /// Wire value of this algorithm.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Raw => 0,
            Self::Gzip => 1,
            Self::Snappy => 2,
            Self::Zlib => 3,
        }
    }
}

/// A byte-wise reversible transform.
pub trait Compressor: Send + Sync {
    /// Compress `data`.
    fn zip(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`Compressor::zip`].
    fn unzip(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// The registered implementation for `kind`.
pub fn compressor(kind: CompressType) -> &'static dyn Compressor {
    match kind {
        CompressType::Raw => &RawCompressor,
        CompressType::Gzip => &GzipCompressor,
        CompressType::Snappy => &SnappyCompressor,
        CompressType::Zlib => &ZlibCompressor,
    }
}

/// Resolve a wire value to its implementation.
///
/// This is the lookup that can fail: a wire id outside the registry is
/// *not found compressor*.
pub fn wire_compressor(value: u16) -> Result<&'static dyn Compressor> {
    CompressType::from_u16(value).map(compressor).ok_or(ProtocolError::NotFoundCompressor)
}

struct RawCompressor;

impl Compressor for RawCompressor {
    fn zip(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn unzip(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn zip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn unzip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

struct SnappyCompressor;

impl Compressor for SnappyCompressor {
    fn zip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut encoder = snap::write::FrameEncoder::new(&mut out);
            encoder.write_all(data)?;
            encoder.flush()?;
        }
        Ok(out)
    }

    fn unzip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        snap::read::FrameDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

struct ZlibCompressor;

impl Compressor for ZlibCompressor {
    fn zip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn unzip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}
