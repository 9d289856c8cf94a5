//! Error types for the price monitor host

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for the price monitor host
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and configuration errors.
///
/// Rejected client certificates are not errors: they are reported as
/// [`AuthenticationResult`](crate::mtls::AuthenticationResult) values.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required certificate or key file does not exist
    #[error("Certificate file not found: {}", path.display())]
    MissingFile {
        /// Path that was looked up
        path: PathBuf,
    },

    /// A required certificate or key file exists but holds only whitespace
    #[error("Certificate file is empty: {}", path.display())]
    EmptyContent {
        /// Path of the blank file
        path: PathBuf,
    },

    /// Trust material was used before a certificate bundle was loaded
    #[error("Certificate bundle not loaded")]
    NotLoaded,

    /// TLS listener configuration error
    #[error("TLS error: {0}")]
    Tls(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error means the process must not start serving.
    ///
    /// Every variant is fatal at startup except plain IO errors, which may
    /// also surface from the listener after startup.
    #[must_use]
    pub fn is_config_fatal(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_message_names_the_path() {
        let err = Error::MissingFile {
            path: PathBuf::from("/etc/pm/ca.crt"),
        };
        assert_eq!(err.to_string(), "Certificate file not found: /etc/pm/ca.crt");
    }

    #[test]
    fn empty_content_message_names_the_path() {
        let err = Error::EmptyContent {
            path: PathBuf::from("certs/server.key"),
        };
        assert_eq!(err.to_string(), "Certificate file is empty: certs/server.key");
    }

    #[test]
    fn not_loaded_is_distinct_from_config() {
        assert!(matches!(Error::NotLoaded, Error::NotLoaded));
        assert_eq!(Error::NotLoaded.to_string(), "Certificate bundle not loaded");
        assert!(Error::NotLoaded.is_config_fatal());
    }

    #[test]
    fn io_errors_are_not_config_fatal() {
        let err = Error::from(io::Error::other("boom"));
        assert!(!err.is_config_fatal());
    }
}
