//! Call records.
//!
//! A [`Call`] represents one outstanding invocation. It lives in its own
//! module so the codec and the client core can both depend on its shape
//! without depending on each other.

use tokio::sync::oneshot;

use crate::error::ClientError;

/// Handle to one outstanding invocation.
///
/// The completion signal has exactly one slot and fires at most once.
/// Dropping the handle abandons the call locally; it does not cancel the
/// request on the server.
#[derive(Debug)]
pub struct Call<R> {
    service_method: String,
    done: oneshot::Receiver<Result<R, ClientError>>,
}

impl<R> Call<R> {
    /// A fresh call and the sender that will complete it.
    pub(crate) fn new(service_method: String) -> (Self, oneshot::Sender<Result<R, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { service_method, done: rx }, tx)
    }

    /// A call that is already terminal, for failures on the submit path.
    pub(crate) fn completed(service_method: String, result: Result<R, ClientError>) -> Self {
        let (call, tx) = Self::new(service_method);
        let _ = tx.send(result);
        call
    }

    /// Dotted `"Service.Method"` this call addresses.
    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    /// Await the terminal outcome: the decoded reply or the call's error.
    pub async fn done(self) -> Result<R, ClientError> {
        self.done.await.unwrap_or(Err(ClientError::Shutdown))
    }
}
