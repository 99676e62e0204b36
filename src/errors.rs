use thiserror::Error;

/// Errors that can occur while resolving and launching a training job.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Configuration error (malformed environment variable, invalid recipe field, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The job could not be started (missing launcher binary, unwritable log location, etc.)
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// IO error occurred (log file, config file, child streams)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Tracing/logging error
    #[error("Tracing error: {0}")]
    Tracing(String),
}

/// Result type alias for launcher operations
pub type Result<T> = std::result::Result<T, LaunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LaunchError::Config("RANK must be a number".to_string());
        assert_eq!(err.to_string(), "Configuration error: RANK must be a number");
    }

    #[test]
    fn test_spawn_error_display() {
        let err = LaunchError::Spawn("torchrun: not found".to_string());
        assert_eq!(err.to_string(), "Spawn error: torchrun: not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LaunchError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }
}
