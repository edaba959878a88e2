//! Error types for notesync-core

use thiserror::Error;

/// Result type alias using notesync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in notesync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Offline store error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level HTTP failure (connection refused, DNS, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote note service answered with a non-success status
    #[error("Remote API error ({status}): {message}")]
    Api {
        /// Status code reported by the service
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// A remote call did not finish within the configured timeout
    #[error("Remote call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from talking to the remote note service.
    ///
    /// Remote failures are recorded per note and never abort a local write.
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. } | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_classified() {
        assert!(Error::Timeout(std::time::Duration::from_secs(1)).is_remote());
        assert!(Error::Api {
            status: 500,
            message: "boom".to_string()
        }
        .is_remote());
        assert!(!Error::Database("locked".to_string()).is_remote());
        assert!(!Error::NotFound("42".to_string()).is_remote());
    }

    #[test]
    fn api_error_message_includes_status() {
        let error = Error::Api {
            status: 404,
            message: "Note not found".to_string(),
        };
        assert_eq!(error.to_string(), "Remote API error (404): Note not found");
    }
}
