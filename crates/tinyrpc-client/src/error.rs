//! Client error types.

use std::io;

use thiserror::Error;
use tinyrpc_proto::ProtocolError;

/// Errors observed on a call record or returned by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client was closed, or the connection ended while closing.
    ///
    /// Every submission after [`crate::Client::close`] completes with this,
    /// as does every call still pending when a requested close tears the
    /// read loop down.
    #[error("connection is shut down")]
    Shutdown,

    /// The connection ended with calls still in flight and no close
    /// requested.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// The server answered the call with an error.
    ///
    /// The text is whatever the response header carried - an application
    /// error from the remote method, verbatim, or one of the server's
    /// dispatch error strings.
    #[error("{0}")]
    Remote(String),

    /// Local wire failure: framing, header, integrity, codec registries,
    /// or transport.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        Self::Protocol(ProtocolError::Io(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_texts() {
        assert_eq!(ClientError::Shutdown.to_string(), "connection is shut down");
        assert_eq!(ClientError::UnexpectedEof.to_string(), "unexpected end of stream");
    }

    #[test]
    fn remote_errors_pass_through_verbatim() {
        assert_eq!(ClientError::Remote("divided is zero".to_string()).to_string(), "divided is zero");
    }
}
