//! Error types for the logging subsystem

use std::fmt;

/// Errors that can occur while setting up logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// A global subscriber is already installed, or install failed
    InitializationFailed(String),
    /// Unparseable level or filter
    InvalidConfiguration(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize logging: {}", msg)
            }
            LoggingError::InvalidConfiguration(msg) => {
                write!(f, "Invalid logging configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for LoggingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_error_display() {
        let err = LoggingError::InvalidConfiguration("unknown log level 'loud'".to_string());
        assert_eq!(err.to_string(), "Invalid logging configuration: unknown log level 'loud'");
    }
}
