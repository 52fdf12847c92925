use std::time::Duration;
use thiserror::Error;

/// Failure reported to a resolution [`Promise`](crate::Promise).
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Lookup of {host} failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Lookup of {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    #[error("No addresses found for {host}")]
    NoAddresses { host: String },

    #[error("Resolution cancelled before completion")]
    Cancelled,
}
