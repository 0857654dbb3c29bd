//! Wire format for the tinyrpc protocol.
//!
//! A connection is an indefinite sequence of messages, each message two
//! frames: a header frame followed by a body frame. This crate owns
//! everything below the codecs:
//!
//! # Components
//!
//! - [`wire`]: minimal-form unsigned varints, the protocol's only
//!   variable-width integer encoding
//! - [`frame`]: length-prefixed frame I/O over an async byte stream
//! - [`header`]: request/response header marshalling
//! - [`compress`]: the per-call compression registry (Raw, Gzip, Snappy,
//!   Zlib)
//! - [`serialize`]: the payload serializer registry (bincode by default)
//! - [`errors`]: the shared protocol error taxonomy
//!
//! The client and server codecs consume these pieces; neither end of the
//! connection is modelled here.

#![forbid(unsafe_code)]

pub mod compress;
pub mod errors;
pub mod frame;
pub mod header;
pub mod serialize;
pub mod wire;

pub use compress::{CompressType, Compressor, compressor, wire_compressor};
pub use errors::{ProtocolError, Result};
pub use frame::{MAX_BODY_FRAME_LEN, MAX_HEADER_FRAME_LEN, recv_frame, send_frame};
pub use header::{RequestHeader, ResponseHeader};
pub use serialize::{Message, Serializer};
