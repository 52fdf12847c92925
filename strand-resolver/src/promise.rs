use crate::error::ResolveError;
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::oneshot;

pub type ResolveResult = Result<Vec<SocketAddr>, ResolveError>;

type Callback = Box<dyn FnOnce(ResolveResult) + Send + 'static>;

/// Single-use completion handle for one resolution.
///
/// Completing consumes the promise. A promise dropped without being completed
/// (e.g. its task was cancelled with the runtime) reports
/// [`ResolveError::Cancelled`], so the callback always runs exactly once.
pub struct Promise {
    callback: Option<Callback>,
}

impl Promise {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(ResolveResult) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Promise whose result is delivered on a oneshot channel.
    pub fn channel() -> (Self, oneshot::Receiver<ResolveResult>) {
        let (tx, rx) = oneshot::channel();
        let promise = Self::new(move |result| {
            // Receiver gone means nobody is waiting any more.
            let _ = tx.send(result);
        });
        (promise, rx)
    }

    pub fn succeeded(self, addrs: Vec<SocketAddr>) {
        self.complete(Ok(addrs));
    }

    pub fn failed(self, error: ResolveError) {
        self.complete(Err(error));
    }

    pub fn complete(mut self, result: ResolveResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(ResolveError::Cancelled));
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("completed", &self.callback.is_none())
            .finish()
    }
}
