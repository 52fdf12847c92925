use crate::error::ResolveError;
use crate::promise::{Promise, ResolveResult};
use crate::SocketAddressResolver;
use std::time::Duration;
use strand_core::config::ResolverConfig;
use tokio::runtime::Handle;
use tracing::debug;

/// DNS resolver that runs every lookup as a task on a shared tokio runtime.
///
/// The runtime handle plays the role of the executor, `timeout` bounds each
/// lookup. The promise is always completed from a runtime thread, after
/// `resolve` has returned.
#[derive(Debug, Clone)]
pub struct AsyncResolver {
    handle: Handle,
    timeout: Duration,
}

impl AsyncResolver {
    pub fn new(handle: Handle, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    pub fn from_config(handle: Handle, config: &ResolverConfig) -> Self {
        Self::new(handle, config.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl SocketAddressResolver for AsyncResolver {
    fn resolve(&self, host: &str, port: u16, promise: Promise) {
        let host = host.to_owned();
        let timeout = self.timeout;
        self.handle.spawn(async move {
            let result = lookup(&host, port, timeout).await;
            match &result {
                Ok(addrs) => debug!(host = %host, port, count = addrs.len(), "Resolved"),
                Err(e) => debug!(host = %host, port, error = %e, "Resolution failed"),
            }
            promise.complete(result);
        });
    }
}

async fn lookup(host: &str, port: u16, timeout: Duration) -> ResolveResult {
    let addrs = match tokio::time::timeout(timeout, tokio::net::lookup_host((host, port))).await {
        Err(_) => {
            return Err(ResolveError::Timeout {
                host: host.to_owned(),
                timeout,
            });
        }
        Ok(Err(source)) => {
            return Err(ResolveError::Lookup {
                host: host.to_owned(),
                source,
            });
        }
        Ok(Ok(iter)) => iter.collect::<Vec<_>>(),
    };

    if addrs.is_empty() {
        return Err(ResolveError::NoAddresses {
            host: host.to_owned(),
        });
    }
    Ok(addrs)
}
