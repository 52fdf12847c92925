use thiserror::Error;

/// Unified error type for Strand.
#[derive(Error, Debug)]
pub enum StrandError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Internal: {0}")]
    Internal(String),
}

impl From<figment::Error> for StrandError {
    fn from(e: figment::Error) -> Self {
        StrandError::Config(e.to_string())
    }
}

impl StrandError {
    /// Process exit code for the `strand` binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            StrandError::Config(_) => 78,
            StrandError::Io(_) => 74,
            StrandError::Metrics(_) | StrandError::Internal(_) => 70,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_with_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StrandError = io.into();
        assert!(matches!(err, StrandError::Io(_)));
        assert_eq!(err.to_string(), "IO error: missing");
    }

    #[test]
    fn exit_codes_follow_sysexits() {
        assert_eq!(StrandError::Config("bad".into()).exit_code(), 78);
        assert_eq!(
            StrandError::Io(std::io::Error::other("disk")).exit_code(),
            74
        );
        assert_eq!(StrandError::Internal("x".into()).exit_code(), 70);
    }
}
