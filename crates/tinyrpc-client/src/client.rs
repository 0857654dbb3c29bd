//! Client core: sequencing, call submission, and the read loop.
//!
//! A [`Client`] owns exactly one codec and one read loop. Submissions run
//! on the caller's task: assign the next sequence, install a completion in
//! the pending map, and write the request under the request mutex. The read
//! loop is the only reader; it correlates each response header to its
//! pending call and fires the call's single-slot completion exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use tinyrpc_proto::{CompressType, Message, ProtocolError, Serializer};

use crate::call::Call;
use crate::codec::{self, RequestWriter, ResponseReader};
use crate::error::ClientError;

/// Client construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientConfig {
    /// Compression applied to request bodies; responses must echo it.
    pub compress: CompressType,
    /// Payload codec; must match the server's.
    pub serializer: Serializer,
}

trait AsyncReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncReadWrite for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

type BoxedStream = Box<dyn AsyncReadWrite>;

/// Consumes the body outcome for one call and fires its completion.
type Completion = Box<dyn FnOnce(Result<Bytes, ClientError>) + Send>;

struct State {
    pending: HashMap<u64, Completion>,
    /// The user asked to close the connection.
    closing: bool,
    /// The read loop has ended; no completion will ever fire again.
    shutdown: bool,
}

struct Inner {
    writer: tokio::sync::Mutex<RequestWriter<BoxedStream>>,
    serializer: Serializer,
    seq: AtomicU64,
    state: Mutex<State>,
}

/// An RPC client multiplexing calls over one framed connection.
///
/// All methods take `&self`; share the client between tasks with [`Arc`].
pub struct Client {
    inner: Arc<Inner>,
    read_task: JoinHandle<()>,
}

impl Client {
    /// Wrap an already-connected full-duplex stream with default options.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_config(stream, ClientConfig::default())
    }

    /// Wrap a stream with explicit compression and serializer choices.
    pub fn with_config<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let stream: BoxedStream = Box::new(stream);
        let (writer, reader) = codec::client_codec(stream, config.compress, config.serializer);
        let inner = Arc::new(Inner {
            writer: tokio::sync::Mutex::new(writer),
            serializer: config.serializer,
            seq: AtomicU64::new(0),
            state: Mutex::new(State {
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
        });
        let read_task = tokio::spawn(read_loop(reader, Arc::clone(&inner)));
        Self { inner, read_task }
    }

    /// Submit a call and return its record without waiting for completion.
    ///
    /// `ttl` is a server-enforced deadline; `None` (or a zero duration)
    /// means the call may take as long as it takes. The client never
    /// cancels locally - a timed-out call completes when the server's
    /// timeout response arrives.
    pub async fn go<A, R>(&self, service_method: &str, args: &A, ttl: Option<Duration>) -> Call<R>
    where
        A: Message,
        R: Message,
    {
        let serializer = self.inner.serializer;
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;

        // The lifecycle check and the pending insertion share one critical
        // section with the teardown flush.
        let call = {
            let mut state = lock(&self.inner.state);
            if state.closing || state.shutdown {
                return Call::completed(service_method.to_string(), Err(ClientError::Shutdown));
            }
            let (call, done) = Call::new(service_method.to_string());
            let complete: Completion = Box::new(move |outcome| {
                let result = outcome.and_then(|body| {
                    let mut reply = R::default();
                    serializer.unmarshal(&body, &mut reply)?;
                    Ok(reply)
                });
                let _ = done.send(result);
            });
            state.pending.insert(seq, complete);
            call
        };

        let deadline_ms = ttl
            .filter(|ttl| !ttl.is_zero())
            .map_or(0, |ttl| unix_millis().saturating_add(ttl.as_millis() as u64));

        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.write_request(seq, service_method, deadline_ms, args).await {
            drop(writer);
            // The read loop may have flushed the entry already if the
            // connection died concurrently.
            if let Some(complete) = lock(&self.inner.state).pending.remove(&seq) {
                complete(Err(ClientError::Protocol(e)));
            }
        }
        call
    }

    /// Invoke synchronously: submit, then await the terminal outcome.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R, ClientError>
    where
        A: Message,
        R: Message,
    {
        self.go(service_method, args, None).await.done().await
    }

    /// Invoke synchronously with a server-enforced deadline of now + `ttl`.
    pub async fn call_with_timeout<A, R>(
        &self,
        service_method: &str,
        args: &A,
        ttl: Duration,
    ) -> Result<R, ClientError>
    where
        A: Message,
        R: Message,
    {
        self.go(service_method, args, Some(ttl)).await.done().await
    }

    /// Close the connection.
    ///
    /// The first call wins: it marks the client closing and shuts the
    /// write half down, which lets the read loop drain to end-of-stream
    /// and complete every outstanding call with
    /// [`ClientError::Shutdown`]. Every later call fails with
    /// [`ClientError::Shutdown`].
    pub async fn close(&self) -> Result<(), ClientError> {
        {
            let mut state = lock(&self.inner.state);
            if state.closing {
                return Err(ClientError::Shutdown);
            }
            state.closing = true;
        }
        let mut writer = self.inner.writer.lock().await;
        writer.close().await?;
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

/// The connection's only response reader.
async fn read_loop(mut reader: ResponseReader<BoxedStream>, inner: Arc<Inner>) {
    loop {
        let meta = match reader.read_response_header().await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!(error = %e, "response read loop terminating");
                break;
            }
        };

        let completion = lock(&inner.state).pending.remove(&meta.seq);
        let Some(complete) = completion else {
            // No call is waiting on this sequence; consume the body to keep
            // the stream aligned.
            if reader.discard_response_body().await.is_err() {
                break;
            }
            continue;
        };

        if !meta.error.is_empty() {
            let drained = reader.discard_response_body().await;
            complete(Err(ClientError::Remote(meta.error)));
            if drained.is_err() {
                break;
            }
            continue;
        }

        match reader.read_response_body().await {
            Ok(body) => complete(Ok(body)),
            Err(e) => {
                // Integrity and codec failures consumed the declared bytes,
                // so the stream is still aligned; transport failures and
                // unread frames are not recoverable.
                let fatal = matches!(
                    e,
                    ProtocolError::Io(_)
                        | ProtocolError::FrameTooLarge { .. }
                        | ProtocolError::VarintOverflow
                );
                complete(Err(ClientError::Protocol(e)));
                if fatal {
                    break;
                }
            }
        }
    }

    let mut state = lock(&inner.state);
    state.shutdown = true;
    let closing = state.closing;
    for (_, complete) in state.pending.drain() {
        let err = if closing { ClientError::Shutdown } else { ClientError::UnexpectedEof };
        complete(Err(err));
    }
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |since| since.as_millis() as u64)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
