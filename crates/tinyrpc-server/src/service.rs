//! The dispatch capability: receivers, method tables, and invokers.
//!
//! A registered service is a receiver plus a [`MethodMap`] - the map from
//! method name to a method descriptor whose argument type, reply type, and
//! invoker were fixed at registration. [`MethodMap::handle`] monomorphizes
//! the descriptor into a closure: unmarshal the argument bytes into the
//! argument type's zero state, run the async handler, marshal the reply.
//!
//! Handlers needing receiver state capture it; [`Service::methods`] hands
//! the receiver over as an [`Arc`] for exactly that purpose.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use tinyrpc_proto::{Message, ProtocolError, Serializer};

/// Application-level failure returned by a service method.
///
/// The text travels to the caller verbatim in the response header.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct MethodError(String);

impl MethodError {
    /// Wrap an error message.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

/// Failures raised while driving a method invoker.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The handler itself failed; its text reaches the caller verbatim.
    #[error("{0}")]
    Method(#[from] MethodError),

    /// The argument or reply payload defeated the serializer.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A dispatchable receiver: a name plus a method table.
pub trait Service: Send + Sync + 'static {
    /// Name used by [`crate::Server::register`];
    /// [`crate::Server::register_name`] overrides it.
    fn name(&self) -> &'static str;

    /// Build the method table. Handlers that need the receiver clone the
    /// [`Arc`] into their closures.
    fn methods(self: Arc<Self>) -> MethodMap;
}

/// One registered method, erased over its argument and reply types.
#[async_trait]
pub(crate) trait Handler: Send + Sync {
    async fn invoke(&self, body: Bytes, serializer: Serializer) -> Result<Vec<u8>, ServiceError>;
}

/// Method name → invoker table for one service.
#[derive(Default)]
pub struct MethodMap {
    methods: HashMap<&'static str, Box<dyn Handler>>,
}

impl MethodMap {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`.
    ///
    /// The argument decodes from the request body into `A::default()` and
    /// the reply serializes back with the connection's serializer. A later
    /// registration under the same name replaces the earlier one.
    pub fn handle<A, R, F, Fut>(mut self, name: &'static str, handler: F) -> Self
    where
        A: Message,
        R: Message,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, MethodError>> + Send + 'static,
    {
        self.methods.insert(name, Box::new(MethodHandler { handler, _types: PhantomData }));
        self
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the table has no methods.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.methods.get(name).map(|handler| &**handler)
    }
}

struct MethodHandler<A, R, F> {
    handler: F,
    _types: PhantomData<fn(A) -> R>,
}

#[async_trait]
impl<A, R, F, Fut> Handler for MethodHandler<A, R, F>
where
    A: Message,
    R: Message,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, MethodError>> + Send + 'static,
{
    async fn invoke(&self, body: Bytes, serializer: Serializer) -> Result<Vec<u8>, ServiceError> {
        let mut args = A::default();
        serializer.unmarshal(&body, &mut args)?;
        let reply = (self.handler)(args).await?;
        Ok(serializer.marshal(Some(&reply))?)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Pair {
        a: i32,
        b: i32,
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Sum {
        c: i32,
    }

    fn table() -> MethodMap {
        MethodMap::new()
            .handle("Add", |args: Pair| async move { Ok(Sum { c: args.a + args.b }) })
            .handle("Fail", |_args: Pair| async move {
                Err::<Sum, _>(MethodError::new("always fails"))
            })
    }

    #[tokio::test]
    async fn invoker_decodes_runs_and_encodes() {
        let table = table();
        let serializer = Serializer::Bincode;
        let body = Bytes::from(serializer.marshal(Some(&Pair { a: 20, b: 5 })).unwrap());

        let handler = table.get("Add").unwrap();
        let reply = handler.invoke(body, serializer).await.unwrap();

        let mut sum = Sum::default();
        serializer.unmarshal(&reply, &mut sum).unwrap();
        assert_eq!(sum, Sum { c: 25 });
    }

    #[tokio::test]
    async fn handler_errors_surface_verbatim() {
        let table = table();
        let serializer = Serializer::Bincode;
        let body = Bytes::from(serializer.marshal(Some(&Pair::default())).unwrap());

        let err = table.get("Fail").unwrap().invoke(body, serializer).await.unwrap_err();
        assert_eq!(err.to_string(), "always fails");
    }

    #[tokio::test]
    async fn empty_body_invokes_with_zero_arguments() {
        let table = table();
        let handler = table.get("Add").unwrap();
        let reply = handler.invoke(Bytes::new(), Serializer::Bincode).await.unwrap();

        let mut sum = Sum::default();
        Serializer::Bincode.unmarshal(&reply, &mut sum).unwrap();
        assert_eq!(sum, Sum { c: 0 });
    }

    #[test]
    fn table_bookkeeping() {
        let table = table();
        assert_eq!(table.len(), 2);
        assert!(table.contains("Add"));
        assert!(!table.contains("Sub"));
        assert!(MethodMap::new().is_empty());
    }

    #[tokio::test]
    async fn stateful_receivers_capture_their_arc() {
        struct Counter {
            step: i32,
        }

        impl Service for Counter {
            fn name(&self) -> &'static str {
                "Counter"
            }

            fn methods(self: Arc<Self>) -> MethodMap {
                let receiver = Arc::clone(&self);
                MethodMap::new().handle("Bump", move |args: Sum| {
                    let receiver = Arc::clone(&receiver);
                    async move { Ok(Sum { c: args.c + receiver.step }) }
                })
            }
        }

        let table = Arc::new(Counter { step: 3 }).methods();
        let serializer = Serializer::Bincode;
        let body = Bytes::from(serializer.marshal(Some(&Sum { c: 4 })).unwrap());
        let reply = table.get("Bump").unwrap().invoke(body, serializer).await.unwrap();

        let mut sum = Sum::default();
        serializer.unmarshal(&reply, &mut sum).unwrap();
        assert_eq!(sum, Sum { c: 7 });
    }
}
