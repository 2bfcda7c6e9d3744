//! Error types for Certflow

use certflow_acme::AcmeError;
use thiserror::Error;

/// Result type for Certflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Certflow
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A referenced certificate, account, website or DNS provider does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Issuance engine error
    #[error(transparent)]
    Acme(#[from] AcmeError),

    /// A deploy script exited unsuccessfully
    #[error("Deploy script for cert '{cert_id}' failed: {message}")]
    Deploy { cert_id: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
