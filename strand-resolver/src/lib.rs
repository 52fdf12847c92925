//! Socket address resolution for outbound HTTP connections.
//!
//! [`LiteralShortcutResolver`] answers IP literals on the caller's thread and
//! hands everything else to a delegate such as [`AsyncResolver`], which runs
//! the lookup on a shared tokio runtime.

pub mod delegate;
pub mod error;
pub mod literal;
pub mod promise;

pub use delegate::AsyncResolver;
pub use error::ResolveError;
pub use literal::LiteralShortcutResolver;
pub use promise::{Promise, ResolveResult};

use std::sync::Arc;

/// Resolves `host:port` and completes `promise` exactly once.
///
/// Completion may happen synchronously inside `resolve` or later on another
/// thread; callers must not assume either.
pub trait SocketAddressResolver: Send + Sync {
    fn resolve(&self, host: &str, port: u16, promise: Promise);
}

impl<R: SocketAddressResolver + ?Sized> SocketAddressResolver for Arc<R> {
    fn resolve(&self, host: &str, port: u16, promise: Promise) {
        (**self).resolve(host, port, promise)
    }
}

impl<R: SocketAddressResolver + ?Sized> SocketAddressResolver for Box<R> {
    fn resolve(&self, host: &str, port: u16, promise: Promise) {
        (**self).resolve(host, port, promise)
    }
}

/// Await a resolution through any resolver.
pub async fn resolve<R>(resolver: &R, host: &str, port: u16) -> ResolveResult
where
    R: SocketAddressResolver + ?Sized,
{
    let (promise, rx) = Promise::channel();
    resolver.resolve(host, port, promise);
    rx.await.unwrap_or(Err(ResolveError::Cancelled))
}
