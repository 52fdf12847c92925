pub mod config;
pub mod error;

pub use config::StrandConfig;
pub use error::StrandError;
