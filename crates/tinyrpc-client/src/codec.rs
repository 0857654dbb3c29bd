//! Client half of the wire codec.
//!
//! [`client_codec`] splits a full-duplex stream into a [`RequestWriter`]
//! and a [`ResponseReader`] that share one pending map (sequence → dotted
//! method name). The writer registers an entry before any I/O; the reader
//! removes it when the matching response header arrives. The reader is
//! single-task by construction - only the client's read loop touches it -
//! while writers serialize through the client core's request mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};

use tinyrpc_proto::{
    CompressType, Message, ProtocolError, RequestHeader, ResponseHeader, Result, Serializer,
    compress, frame,
};

/// In-flight request names shared between the two halves.
type PendingMethods = Arc<Mutex<HashMap<u64, String>>>;

/// Split `stream` into the two codec halves.
pub fn client_codec<S>(
    stream: S,
    compress: CompressType,
    serializer: Serializer,
) -> (RequestWriter<S>, ResponseReader<S>)
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(stream);
    let pending = Arc::new(Mutex::new(HashMap::new()));
    (
        RequestWriter {
            writer: BufWriter::new(writer),
            compress,
            serializer,
            pending: Arc::clone(&pending),
        },
        ResponseReader {
            reader: BufReader::new(reader),
            compress,
            response: ResponseHeader::default(),
            pending,
        },
    )
}

/// Writes requests onto the stream.
pub struct RequestWriter<S> {
    writer: BufWriter<WriteHalf<S>>,
    compress: CompressType,
    serializer: Serializer,
    pending: PendingMethods,
}

impl<S> RequestWriter<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Serialize, compress, and emit one request as header and body frames,
    /// then flush.
    ///
    /// The pending entry is registered before any I/O, so a write failure
    /// leaves it for the read path to reap at teardown.
    pub async fn write_request<M: Message>(
        &mut self,
        seq: u64,
        service_method: &str,
        deadline_ms: u64,
        args: &M,
    ) -> Result<()> {
        lock(&self.pending).insert(seq, service_method.to_string());

        let body = self.serializer.marshal(Some(args))?;
        let body = compress::compressor(self.compress).zip(&body)?;
        let request_len = u32::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: body.len() as u64,
            max: frame::MAX_BODY_FRAME_LEN,
        })?;

        let header = RequestHeader {
            compress_type: self.compress.to_u16(),
            method: service_method.to_string(),
            id: seq,
            request_len,
            checksum: crc32fast::hash(&body),
            deadline_ms,
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

/// Outcome of reading one response header.
#[derive(Debug)]
pub struct ResponseMeta {
    /// Sequence number the response answers.
    pub seq: u64,
    /// Dotted method restored from the pending map; `None` when the
    /// sequence has no in-flight request on this codec.
    pub service_method: Option<String>,
    /// Error text carried by the header; empty means success.
    pub error: String,
}

/// Reads responses off the stream.
pub struct ResponseReader<S> {
    reader: BufReader<ReadHalf<S>>,
    compress: CompressType,
    response: ResponseHeader,
    pending: PendingMethods,
}

impl<S> ResponseReader<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Read and parse one response header frame, removing the matching
    /// pending entry.
    pub async fn read_response_header(&mut self) -> Result<ResponseMeta> {
        self.response.reset();
        let data = frame::recv_frame(&mut self.reader, frame::MAX_HEADER_FRAME_LEN).await?;
        self.response.unmarshal(&data)?;
        let service_method = lock(&self.pending).remove(&self.response.id);
        Ok(ResponseMeta {
            seq: self.response.id,
            service_method,
            error: self.response.error.clone(),
        })
    }

    /// Read, verify, and decompress the body of the last-read header.
    ///
    /// The returned bytes are the serialized payload, ready for a typed
    /// unmarshal by whoever owns the reply slot.
    pub async fn read_response_body(&mut self) -> Result<Bytes> {
        let body = frame::recv_frame(&mut self.reader, frame::MAX_BODY_FRAME_LEN).await?;
        if body.len() != self.response.response_len as usize {
            return Err(ProtocolError::BodyLengthMismatch {
                declared: self.response.response_len,
                actual: body.len(),
            });
        }
        if self.response.checksum != 0 && crc32fast::hash(&body) != self.response.checksum {
            return Err(ProtocolError::UnexpectedChecksum);
        }
        let kind = CompressType::from_u16(self.response.compress_type)
            .ok_or(ProtocolError::NotFoundCompressor)?;
        if kind != self.compress {
            return Err(ProtocolError::CompressorMismatch);
        }
        let payload = compress::compressor(kind).unzip(&body)?;
        Ok(Bytes::from(payload))
    }

    /// Read and discard one body frame, keeping the stream aligned.
    pub async fn discard_response_body(&mut self) -> Result<()> {
        frame::recv_frame(&mut self.reader, frame::MAX_BODY_FRAME_LEN).await?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use tinyrpc_proto::frame::{MAX_BODY_FRAME_LEN, MAX_HEADER_FRAME_LEN, recv_frame, send_frame};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Ping {
        value: i32,
    }

    #[tokio::test]
    async fn write_request_emits_header_then_body_frames() {
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        let (mut writer, _reader) =
            client_codec(near, CompressType::Raw, Serializer::Bincode);

        writer.write_request(7, "Echo.Ping", 0, &Ping { value: 42 }).await.unwrap();

        let mut header = RequestHeader::default();
        header.unmarshal(&recv_frame(&mut far, MAX_HEADER_FRAME_LEN).await.unwrap()).unwrap();
        let body = recv_frame(&mut far, MAX_BODY_FRAME_LEN).await.unwrap();

        assert_eq!(header.method, "Echo.Ping");
        assert_eq!(header.id, 7);
        assert_eq!(header.compress_type, CompressType::Raw.to_u16());
        assert_eq!(header.request_len as usize, body.len());
        assert_eq!(header.checksum, crc32fast::hash(&body));
        assert_eq!(header.deadline_ms, 0);

        let mut decoded = Ping::default();
        Serializer::Bincode.unmarshal(&body, &mut decoded).unwrap();
        assert_eq!(decoded, Ping { value: 42 });
    }

    #[tokio::test]
    async fn write_request_carries_the_deadline() {
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        let (mut writer, _reader) =
            client_codec(near, CompressType::Raw, Serializer::Bincode);

        writer.write_request(1, "Echo.Ping", 1_234_567, &Ping::default()).await.unwrap();

        let mut header = RequestHeader::default();
        header.unmarshal(&recv_frame(&mut far, MAX_HEADER_FRAME_LEN).await.unwrap()).unwrap();
        assert_eq!(header.deadline_ms, 1_234_567);
    }

    async fn send_response<W>(far: &mut W, seq: u64, error: &str, payload: &[u8], kind: CompressType)
    where
        W: AsyncWrite + Unpin,
    {
        let body = compress::compressor(kind).zip(payload).unwrap();
        let header = ResponseHeader {
            compress_type: kind.to_u16(),
            id: seq,
            error: error.to_string(),
            response_len: body.len() as u32,
            checksum: crc32fast::hash(&body),
        };
        send_frame(far, &header.marshal()).await.unwrap();
        send_frame(far, &body).await.unwrap();
    }

    #[tokio::test]
    async fn response_round_trip_restores_the_pending_method() {
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        let (mut writer, mut reader) =
            client_codec(near, CompressType::Raw, Serializer::Bincode);

        writer.write_request(3, "Echo.Ping", 0, &Ping { value: 1 }).await.unwrap();
        recv_frame(&mut far, MAX_HEADER_FRAME_LEN).await.unwrap();
        recv_frame(&mut far, MAX_BODY_FRAME_LEN).await.unwrap();

        let payload = Serializer::Bincode.marshal(Some(&Ping { value: 2 })).unwrap();
        send_response(&mut far, 3, "", &payload, CompressType::Raw).await;

        let meta = reader.read_response_header().await.unwrap();
        assert_eq!(meta.seq, 3);
        assert_eq!(meta.service_method.as_deref(), Some("Echo.Ping"));
        assert!(meta.error.is_empty());

        let body = reader.read_response_body().await.unwrap();
        let mut reply = Ping::default();
        Serializer::Bincode.unmarshal(&body, &mut reply).unwrap();
        assert_eq!(reply, Ping { value: 2 });

        // A second header for the same sequence no longer finds an entry.
        send_response(&mut far, 3, "", &payload, CompressType::Raw).await;
        let meta = reader.read_response_header().await.unwrap();
        assert_eq!(meta.service_method, None);
    }

    #[tokio::test]
    async fn corrupted_body_byte_fails_the_checksum() {
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        let (_writer, mut reader) = client_codec(near, CompressType::Raw, Serializer::Bincode);

        let mut body = Serializer::Bincode.marshal(Some(&Ping { value: 2 })).unwrap();
        let header = ResponseHeader {
            compress_type: CompressType::Raw.to_u16(),
            id: 1,
            error: String::new(),
            response_len: body.len() as u32,
            checksum: crc32fast::hash(&body),
        };
        body[0] ^= 0xff;
        send_frame(&mut far, &header.marshal()).await.unwrap();
        send_frame(&mut far, &body).await.unwrap();

        reader.read_response_header().await.unwrap();
        let err = reader.read_response_body().await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedChecksum));
        assert_eq!(err.to_string(), "unexpected checksum");
    }

    #[tokio::test]
    async fn response_with_different_compressor_is_a_mismatch() {
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        let (_writer, mut reader) = client_codec(near, CompressType::Raw, Serializer::Bincode);

        let payload = Serializer::Bincode.marshal(Some(&Ping { value: 2 })).unwrap();
        send_response(&mut far, 1, "", &payload, CompressType::Gzip).await;

        reader.read_response_header().await.unwrap();
        let err = reader.read_response_body().await.unwrap_err();
        assert!(matches!(err, ProtocolError::CompressorMismatch));
        assert_eq!(err.to_string(), "request and response Compressor type mismatch");
    }

    #[tokio::test]
    async fn unknown_response_compressor_is_not_found() {
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        let (_writer, mut reader) = client_codec(near, CompressType::Raw, Serializer::Bincode);

        let header = ResponseHeader {
            compress_type: 9,
            id: 1,
            error: String::new(),
            response_len: 0,
            checksum: 0,
        };
        send_frame(&mut far, &header.marshal()).await.unwrap();
        send_frame(&mut far, &[]).await.unwrap();

        reader.read_response_header().await.unwrap();
        let err = reader.read_response_body().await.unwrap_err();
        assert!(matches!(err, ProtocolError::NotFoundCompressor));
    }

    #[tokio::test]
    async fn discard_keeps_the_stream_aligned() {
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        let (_writer, mut reader) = client_codec(near, CompressType::Raw, Serializer::Bincode);

        let payload = Serializer::Bincode.marshal(Some(&Ping { value: 9 })).unwrap();
        send_response(&mut far, 1, "boom", &[], CompressType::Raw).await;
        send_response(&mut far, 2, "", &payload, CompressType::Raw).await;

        let meta = reader.read_response_header().await.unwrap();
        assert_eq!(meta.error, "boom");
        reader.discard_response_body().await.unwrap();

        let meta = reader.read_response_header().await.unwrap();
        assert_eq!(meta.seq, 2);
        let body = reader.read_response_body().await.unwrap();
        let mut reply = Ping::default();
        Serializer::Bincode.unmarshal(&body, &mut reply).unwrap();
        assert_eq!(reply, Ping { value: 9 });
    }
}
