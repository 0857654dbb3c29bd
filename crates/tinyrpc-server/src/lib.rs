//! tinyrpc server.
//!
//! Hosts user-defined services behind the framed wire protocol. A
//! connection is served by one request-reading loop that spawns a dispatch
//! task per call; responses are written back in completion order under a
//! send mutex, correlated by sequence number.
//!
//! # Components
//!
//! - [`Server`]: the registry plus the serve loops
//! - [`Service`] / [`MethodMap`]: the dispatch capability - a receiver and
//!   its table of typed method invokers
//! - [`codec`]: the request-reader and response-writer halves of the wire
//!   codec
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tinyrpc_server::{MethodError, MethodMap, Server, Service};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Debug, Default, Serialize, Deserialize)]
//! # struct ArithRequest { a: i32, b: i32 }
//! # #[derive(Debug, Default, Serialize, Deserialize)]
//! # struct ArithResponse { c: i32 }
//!
//! struct ArithService;
//!
//! impl Service for ArithService {
//!     fn name(&self) -> &'static str {
//!         "ArithService"
//!     }
//!
//!     fn methods(self: Arc<Self>) -> MethodMap {
//!         MethodMap::new()
//!             .handle("Add", |args: ArithRequest| async move {
//!                 Ok(ArithResponse { c: args.a + args.b })
//!             })
//!             .handle("Div", |args: ArithRequest| async move {
//!                 if args.b == 0 {
//!                     return Err(MethodError::new("divided is zero"));
//!                 }
//!                 Ok(ArithResponse { c: args.a / args.b })
//!             })
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = Server::new();
//! server.register(ArithService)?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8082").await?;
//! Arc::new(server).serve(listener).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod codec;
mod errors;
mod server;
mod service;

pub use codec::{RequestMeta, RequestReader, ResponseWriter, server_codec};
pub use errors::{DispatchError, ServerError};
pub use server::{Server, ServerConfig};
pub use service::{MethodError, MethodMap, Service, ServiceError};
pub use tinyrpc_proto::{CompressType, Message, Serializer};
