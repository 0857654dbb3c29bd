//! Server error types.

use thiserror::Error;
use tinyrpc_proto::ProtocolError;

/// Errors returned by registration and the serve loops.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A service with this name is already registered.
    #[error("rpc: service already defined: {0}")]
    ServiceAlreadyDefined(String),

    /// The receiver's method table is empty, so nothing is dispatchable.
    #[error("rpc: service {0} defines no methods")]
    NoMethods(String),

    /// Wire failure on the connection being served.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Per-call addressing failures.
///
/// These never terminate the connection; the display text is sent to the
/// caller in the response header.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The name has no dot separating service from method.
    #[error("rpc: service/method request ill-formed: {0}")]
    IllFormed(String),

    /// No service under that name.
    #[error("rpc: can't find service {0}")]
    UnknownService(String),

    /// The service exists but has no such method.
    #[error("rpc: can't find method {0}")]
    UnknownMethod(String),
}
