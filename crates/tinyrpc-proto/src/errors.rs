//! Protocol error taxonomy.
//!
//! One enum covers the wire layer end to end: framing, header parsing,
//! integrity verification, the compressor and serializer registries, and
//! the transport underneath. The per-variant display texts are part of the
//! protocol surface - they travel in response headers and are observed by
//! remote callers - so they are fixed strings, not formatting conveniences.

use std::io;

use thiserror::Error;

/// Convenience alias for fallible wire-layer operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced by the wire layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header bytes were truncated or a varint overran the buffer.
    ///
    /// Fatal to the connection: once a header fails to parse the stream is
    /// no longer aligned on a frame boundary.
    #[error("corrupt header")]
    CorruptHeader,

    /// A frame length prefix did not fit in 64 bits.
    #[error("frame length varint overflows 64 bits")]
    VarintOverflow,

    /// A frame declared a length beyond the permitted cap.
    ///
    /// Enforced before allocating, so a hostile length cannot exhaust
    /// memory.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Declared frame length.
        size: u64,
        /// Cap the frame was checked against.
        max: u64,
    },

    /// A body frame's length disagreed with the header's declared length.
    #[error("body frame of {actual} bytes does not match the declared {declared}")]
    BodyLengthMismatch {
        /// Length the header declared.
        declared: u32,
        /// Length the body frame actually carried.
        actual: usize,
    },

    /// The CRC-32 of the received body did not match the header.
    #[error("unexpected checksum")]
    UnexpectedChecksum,

    /// The wire carried a compressor id the registry does not know.
    #[error("not found compressor")]
    NotFoundCompressor,

    /// A response was compressed with a different algorithm than its
    /// request.
    #[error("request and response Compressor type mismatch")]
    CompressorMismatch,

    /// A response referenced a sequence with no pending request.
    #[error("invalid sequence number in response")]
    InvalidSequence,

    /// The payload value cannot be handled by the active serializer.
    #[error("payload does not implement the serializer's message contract")]
    IncompatiblePayload(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Underlying transport failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
