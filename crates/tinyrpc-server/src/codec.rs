//! Server half of the wire codec.
//!
//! [`server_codec`] splits a full-duplex stream into a [`RequestReader`]
//! and a [`ResponseWriter`]. One mutex guards the shared state - the
//! monotonic server-local sequence counter and the pending map from that
//! sequence to the request's `(client id, compress type)` - so a response
//! can echo the client's original id and compress its body with the same
//! algorithm the request chose.
//!
//! The reader is exclusive to the connection's serve loop; the writer is
//! shared across dispatch tasks behind the server core's send mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};

use tinyrpc_proto::{
    CompressType, ProtocolError, RequestHeader, ResponseHeader, Result, compress, frame,
};

/// What a request header tells the serve loop.
#[derive(Debug)]
pub struct RequestMeta {
    /// Server-local sequence assigned to this request.
    pub seq: u64,
    /// Dotted `"Service.Method"` target.
    pub service_method: String,
    /// Absolute deadline in unix milliseconds; 0 means none.
    pub deadline_ms: u64,
}

struct RequestContext {
    /// Client-chosen id, echoed in the response header.
    id: u64,
    /// Wire compressor id the request body used; replies reuse it.
    compress_type: u16,
}

struct CodecState {
    seq: u64,
    pending: HashMap<u64, RequestContext>,
}

type SharedState = Arc<Mutex<CodecState>>;

/// Split `stream` into the two codec halves.
pub fn server_codec<S>(stream: S) -> (RequestReader<S>, ResponseWriter<S>)
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(stream);
    let state = Arc::new(Mutex::new(CodecState { seq: 0, pending: HashMap::new() }));
    (
        RequestReader {
            reader: BufReader::new(reader),
            request: RequestHeader::default(),
            state: Arc::clone(&state),
        },
        ResponseWriter { writer: BufWriter::new(writer), state },
    )
}

/// Reads requests off the stream.
pub struct RequestReader<S> {
    reader: BufReader<ReadHalf<S>>,
    request: RequestHeader,
    state: SharedState,
}

impl<S> RequestReader<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Read one request header frame and allocate its server sequence.
    pub async fn read_request_header(&mut self) -> Result<RequestMeta> {
        self.request.reset();
        let data = frame::recv_frame(&mut self.reader, frame::MAX_HEADER_FRAME_LEN).await?;
        self.request.unmarshal(&data)?;

        let seq = {
            let mut state = lock(&self.state);
            state.seq += 1;
            let seq = state.seq;
            state.pending.insert(
                seq,
                RequestContext { id: self.request.id, compress_type: self.request.compress_type },
            );
            seq
        };

        Ok(RequestMeta {
            seq,
            service_method: self.request.method.clone(),
            deadline_ms: self.request.deadline_ms,
        })
    }

    /// Read, verify, and decompress the body of the last-read header.
    ///
    /// Returns the serialized argument bytes; the typed unmarshal happens
    /// inside the method invoker that knows the argument type.
    pub async fn read_request_body(&mut self) -> Result<Bytes> {
        let body = frame::recv_frame(&mut self.reader, frame::MAX_BODY_FRAME_LEN).await?;
        if body.len() != self.request.request_len as usize {
            return Err(ProtocolError::BodyLengthMismatch {
                declared: self.request.request_len,
                actual: body.len(),
            });
        }
        if self.request.checksum != 0 && crc32fast::hash(&body) != self.request.checksum {
            return Err(ProtocolError::UnexpectedChecksum);
        }
        let compressor = compress::wire_compressor(self.request.compress_type)?;
        Ok(Bytes::from(compressor.unzip(&body)?))
    }

    /// Read and discard one body frame, keeping the stream aligned.
    pub async fn discard_request_body(&mut self) -> Result<()> {
        frame::recv_frame(&mut self.reader, frame::MAX_BODY_FRAME_LEN).await?;
        Ok(())
    }
}

/// Writes responses onto the stream.
pub struct ResponseWriter<S> {
    writer: BufWriter<WriteHalf<S>>,
    state: SharedState,
}

impl<S> ResponseWriter<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Emit one response as header and body frames, then flush.
    ///
    /// `reply` is the serialized payload. When `error` is non-empty the
    /// payload is ignored and the response declares a zero-length body.
    /// Completing a sequence with no pending request fails with
    /// *invalid sequence number in response*.
    pub async fn write_response(&mut self, seq: u64, error: &str, reply: &[u8]) -> Result<()> {
        let context =
            lock(&self.state).pending.remove(&seq).ok_or(ProtocolError::InvalidSequence)?;

        let body = if error.is_empty() {
            let kind = CompressType::from_u16(context.compress_type)
                .ok_or(ProtocolError::NotFoundCompressor)?;
            compress::compressor(kind).zip(reply)?
        } else {
            Vec::new()
        };
        let response_len = u32::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: body.len() as u64,
            max: frame::MAX_BODY_FRAME_LEN,
        })?;

        let header = ResponseHeader {
            compress_type: context.compress_type,
            id: context.id,
            error: error.to_string(),
            response_len,
            checksum: crc32fast::hash(&body),
        };

        frame::send_frame(&mut self.writer, &header.marshal()).await?;
        frame::send_frame(&mut self.writer, &body).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flush buffered bytes and shut the write half down.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
