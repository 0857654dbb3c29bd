//! tinyrpc client.
//!
//! Multiplexes calls over a single framed full-duplex connection. The
//! caller's tasks submit requests; one spawned read loop correlates
//! responses back to their call records by sequence number.
//!
//! # Components
//!
//! - [`Client`]: submission surface (`go`, `call`, `call_with_timeout`,
//!   `close`) and the connection lifecycle
//! - [`Call`]: handle to one outstanding invocation with a single-slot
//!   completion signal
//! - [`codec`]: the request-writer and response-reader halves of the wire
//!   codec
//!
//! # Example
//!
//! ```no_run
//! use tinyrpc_client::Client;
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Debug, Default, Serialize, Deserialize)]
//! # struct ArithRequest { a: i32, b: i32 }
//! # #[derive(Debug, Default, Serialize, Deserialize)]
//! # struct ArithResponse { c: i32 }
//!
//! # async fn run() -> Result<(), tinyrpc_client::ClientError> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:8082").await?;
//! let client = Client::new(stream);
//! let reply: ArithResponse =
//!     client.call("ArithService.Add", &ArithRequest { a: 20, b: 5 }).await?;
//! assert_eq!(reply.c, 25);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod call;
mod client;
pub mod codec;
mod error;

pub use call::Call;
pub use client::{Client, ClientConfig};
pub use codec::{RequestWriter, ResponseMeta, ResponseReader, client_codec};
pub use error::ClientError;
pub use tinyrpc_proto::{CompressType, Message, Serializer};
