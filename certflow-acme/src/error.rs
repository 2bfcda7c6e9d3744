//! ACME error types

use std::time::Duration;
use thiserror::Error;

use crate::solver::dns::DnsProviderError;

/// Result type for issuance operations
pub type AcmeResult<T> = Result<T, AcmeError>;

/// ACME error types
#[derive(Debug, Error)]
pub enum AcmeError {
    /// Malformed PEM key or certificate
    #[error("🧩 Parse error: {0}")]
    Parse(String),

    #[error("🔑 Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// The CA rejected the registration (bad EAB, rate limit, malformed contact)
    #[error("👤 Account registration failed: {0}")]
    Registration(String),

    /// The CA has no account bound to the supplied key
    #[error("👤 Account lookup failed: {0}")]
    AccountLookup(String),

    #[error("🚫 Challenge type {challenge} cannot validate domain {domain}")]
    UnsupportedChallenge { domain: String, challenge: String },

    #[error("⚠️ Challenge solver error: {0}")]
    Solver(String),

    #[error("📡 DNS provider error: {0}")]
    DnsProvider(#[from] DnsProviderError),

    /// CA-reported validation, order or rate-limit failure
    #[error("❌ Issuance failed: {0}")]
    Issuance(String),

    #[error("⌛ Manual session expired or not started, run the manual DNS step again")]
    SessionExpired,

    #[error("🛑 Manual session {0} was cancelled")]
    SessionCancelled(String),

    #[error("🎯 No challenge solver selected")]
    NoSolver,

    #[error("⏰ Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("💥 IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("🔴 ACME protocol error: {0}")]
    Protocol(String),
}

impl From<instant_acme::Error> for AcmeError {
    fn from(e: instant_acme::Error) -> Self {
        AcmeError::Protocol(e.to_string())
    }
}

impl From<openssl::error::ErrorStack> for AcmeError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        AcmeError::Parse(e.to_string())
    }
}

/// Run `fut` under a deadline, mapping elapsed time to [`AcmeError::Timeout`]
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> AcmeResult<T>
where
    F: std::future::Future<Output = AcmeResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AcmeError::Timeout(deadline)),
    }
}
