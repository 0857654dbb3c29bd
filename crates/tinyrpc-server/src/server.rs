//! Server core: registration, the per-connection serve loop, and dispatch.
//!
//! Registration happens before serving, so the registry is read-only while
//! connections are live and lookups take no lock. Each connection gets one
//! request-reading loop; every accepted request is dispatched on its own
//! task, tracked by a [`JoinSet`] that must drain before the codec closes.
//! Responses may complete in any order - the send mutex serializes the
//! actual stream writes, and sequence numbers reassemble the pairs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use tinyrpc_proto::Serializer;

use crate::codec::{self, RequestReader, ResponseWriter};
use crate::errors::{DispatchError, ServerError};
use crate::service::{MethodMap, Service};

/// Error text written when a dispatch loses the race against its deadline.
const CALL_TIMEOUT: &str = "tinyrpc: call timeout";

/// Server construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerConfig {
    /// Payload codec; must match connecting clients.
    pub serializer: Serializer,
}

/// An RPC server hosting registered services.
pub struct Server {
    services: HashMap<String, Arc<MethodMap>>,
    serializer: Serializer,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// A server with default options.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// A server with explicit options.
    pub fn with_config(config: ServerConfig) -> Self {
        Self { services: HashMap::new(), serializer: config.serializer }
    }

    /// Register `service` under its own name.
    pub fn register<S: Service>(&mut self, service: S) -> Result<(), ServerError> {
        let name = service.name();
        self.register_name(name, service)
    }

    /// Register `service` under `name`.
    ///
    /// Duplicate names and empty method tables are rejected.
    pub fn register_name<S: Service>(&mut self, name: &str, service: S) -> Result<(), ServerError> {
        if self.services.contains_key(name) {
            return Err(ServerError::ServiceAlreadyDefined(name.to_string()));
        }
        let methods = Arc::new(service).methods();
        if methods.is_empty() {
            return Err(ServerError::NoMethods(name.to_string()));
        }
        self.services.insert(name.to_string(), Arc::new(methods));
        Ok(())
    }

    /// Resolve a dotted `"Service.Method"` name against the registry.
    ///
    /// The last dot separates service from method.
    fn resolve(&self, service_method: &str) -> Result<(Arc<MethodMap>, String), DispatchError> {
        let Some(dot) = service_method.rfind('.') else {
            return Err(DispatchError::IllFormed(service_method.to_string()));
        };
        let service = &service_method[..dot];
        let method = &service_method[dot + 1..];
        let Some(methods) = self.services.get(service) else {
            return Err(DispatchError::UnknownService(service_method.to_string()));
        };
        if !methods.contains(method) {
            return Err(DispatchError::UnknownMethod(service_method.to_string()));
        }
        Ok((Arc::clone(methods), method.to_string()))
    }

    /// Accept connections and serve each on its own task.
    ///
    /// Returns when the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "accepted connection");
                    tokio::spawn(Arc::clone(&self).serve_codec(stream));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    /// Serve one connection until its stream ends or misaligns.
    ///
    /// Header-stage failures terminate the loop; per-call failures (bad
    /// addressing, body integrity, handler errors, deadlines) produce
    /// error responses and the loop continues. In-flight dispatches are
    /// drained before the codec closes.
    pub async fn serve_codec<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = codec::server_codec(stream);
        let writer = Arc::new(Mutex::new(writer));
        let mut dispatches = JoinSet::new();

        loop {
            let meta = match reader.read_request_header().await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!(error = %e, "request read loop terminating");
                    break;
                }
            };

            let (methods, method) = match self.resolve(&meta.service_method) {
                Ok(resolved) => resolved,
                Err(e) => {
                    if reader.discard_request_body().await.is_err() {
                        break;
                    }
                    respond(&writer, meta.seq, &e.to_string(), &[]).await;
                    continue;
                }
            };

            let body = match reader.read_request_body().await {
                Ok(body) => body,
                Err(e) => {
                    respond(&writer, meta.seq, &e.to_string(), &[]).await;
                    continue;
                }
            };

            let serializer = self.serializer;
            let writer = Arc::clone(&writer);
            dispatches.spawn(async move {
                match dispatch(&methods, &method, body, serializer, meta.deadline_ms).await {
                    Ok(reply) => respond(&writer, meta.seq, "", &reply).await,
                    Err(text) => respond(&writer, meta.seq, &text, &[]).await,
                }
            });
        }

        while dispatches.join_next().await.is_some() {}

        let mut writer = writer.lock().await;
        if let Err(e) = writer.close().await {
            tracing::debug!(error = %e, "codec close failed");
        }
    }

    /// Serve exactly one request synchronously.
    ///
    /// Dispatch runs inline and the codec stays open.
    pub async fn serve_request<S>(
        &self,
        reader: &mut RequestReader<S>,
        writer: &mut ResponseWriter<S>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite,
    {
        let meta = reader.read_request_header().await?;

        let (methods, method) = match self.resolve(&meta.service_method) {
            Ok(resolved) => resolved,
            Err(e) => {
                reader.discard_request_body().await?;
                writer.write_response(meta.seq, &e.to_string(), &[]).await?;
                return Ok(());
            }
        };

        let body = match reader.read_request_body().await {
            Ok(body) => body,
            Err(e) => {
                writer.write_response(meta.seq, &e.to_string(), &[]).await?;
                return Ok(());
            }
        };

        match dispatch(&methods, &method, body, self.serializer, meta.deadline_ms).await {
            Ok(reply) => writer.write_response(meta.seq, "", &reply).await?,
            Err(text) => writer.write_response(meta.seq, &text, &[]).await?,
        }
        Ok(())
    }
}

/// Run the invoker, racing the request deadline when one was carried.
///
/// A timer win drops the invocation future, so a delayed handler result is
/// discarded rather than written.
async fn dispatch(
    methods: &MethodMap,
    method: &str,
    body: Bytes,
    serializer: Serializer,
    deadline_ms: u64,
) -> Result<Vec<u8>, String> {
    let Some(handler) = methods.get(method) else {
        // Resolution checked this before the body was read; answer anyway
        // rather than drop the call on the floor.
        return Err(DispatchError::UnknownMethod(method.to_string()).to_string());
    };

    let invocation = handler.invoke(body, serializer);
    if deadline_ms == 0 {
        return invocation.await.map_err(|e| e.to_string());
    }

    let remaining = Duration::from_millis(deadline_ms.saturating_sub(unix_millis()));
    if remaining.is_zero() {
        tracing::debug!(method, deadline_ms, "deadline already expired");
        return Err(CALL_TIMEOUT.to_string());
    }
    match tokio::time::timeout(remaining, invocation).await {
        Ok(outcome) => outcome.map_err(|e| e.to_string()),
        Err(_) => {
            tracing::debug!(method, deadline_ms, "dispatch timed out");
            Err(CALL_TIMEOUT.to_string())
        }
    }
}

/// Write one response under the send mutex.
async fn respond<S>(writer: &Mutex<ResponseWriter<S>>, seq: u64, error: &str, reply: &[u8])
where
    S: AsyncRead + AsyncWrite,
{
    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_response(seq, error, reply).await {
        tracing::error!(seq, error = %e, "failed to write response");
    }
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |since| since.as_millis() as u64)
}
