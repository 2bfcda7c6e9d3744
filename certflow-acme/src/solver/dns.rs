//! DNS-01 through a provider API
//!
//! The [`DnsProvider`] trait is the integration point for DNS hosting
//! services; [`DnsAutoSolver`] drives it during issuance.

use super::{Challenge, ChallengeKind, ChallengeSolver};
use crate::error::AcmeResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Result type for DNS operations
pub type DnsResult<T> = Result<T, DnsProviderError>;

/// Errors that can occur during DNS provider operations
#[derive(Debug, Error)]
pub enum DnsProviderError {
    /// Record creation failed
    #[error("Failed to create TXT record '{record_name}': {message}")]
    RecordCreation { record_name: String, message: String },

    /// Record deletion failed
    #[error("Failed to delete TXT record '{record_id}': {message}")]
    RecordDeletion { record_id: String, message: String },

    /// API request failed
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Request timeout
    #[error("Request timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// A TXT record as known to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    /// Provider-side identifier, used for deletion
    pub id: String,
    /// Fully qualified record name (`_acme-challenge.example.com`)
    pub fqdn: String,
    pub value: String,
}

/// Trait for DNS providers that can host DNS-01 TXT records
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    /// Returns the provider name (e.g., "hook", "cloudflare")
    fn name(&self) -> &'static str;

    /// Look up an existing TXT record with exactly this name and value
    async fn find_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<Option<TxtRecord>>;

    /// Create a TXT record, a short TTL is expected
    async fn create_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<TxtRecord>;

    /// Delete a TXT record previously returned by this provider
    async fn delete_txt_record(&self, record: &TxtRecord) -> DnsResult<()>;
}

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// Strip a leading `*.` so wildcard and apex share one record name
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// Build the full ACME challenge record name
///
/// For `example.com` and `*.example.com`, returns `_acme-challenge.example.com`
pub fn challenge_record_fqdn(domain: &str) -> String {
    format!("{}.{}", ACME_CHALLENGE_RECORD, normalize_domain(domain))
}

/// 📡 DNS-01 solver backed by a [`DnsProvider`]
///
/// Present is create-if-absent and cleanup is delete-if-present, so a retried
/// issuance never duplicates or trips over records.
#[derive(Debug)]
pub struct DnsAutoSolver {
    provider: Arc<dyn DnsProvider>,
    /// (fqdn, value) -> record created or found during present
    records: Mutex<HashMap<(String, String), TxtRecord>>,
}

impl DnsAutoSolver {
    pub fn new(provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            provider,
            records: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChallengeSolver for DnsAutoSolver {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Dns01
    }

    async fn present(&self, challenge: &Challenge) -> AcmeResult<()> {
        let fqdn = challenge_record_fqdn(&challenge.domain);
        let value = challenge.dns_value();

        let record = match self.provider.find_txt_record(&fqdn, &value).await? {
            Some(existing) => {
                tracing::debug!("📡 TXT record {} already present, reusing it", fqdn);
                existing
            }
            None => {
                tracing::info!("📡 Creating TXT record {} via {}", fqdn, self.provider.name());
                self.provider.create_txt_record(&fqdn, &value).await?
            }
        };

        self.records.lock().insert((fqdn, value), record);
        Ok(())
    }

    async fn cleanup(&self, challenge: &Challenge) -> AcmeResult<()> {
        let fqdn = challenge_record_fqdn(&challenge.domain);
        let value = challenge.dns_value();

        let known = self.records.lock().remove(&(fqdn.clone(), value.clone()));
        let record = match known {
            Some(record) => Some(record),
            None => self.provider.find_txt_record(&fqdn, &value).await?,
        };

        match record {
            Some(record) => {
                self.provider.delete_txt_record(&record).await?;
                tracing::info!("🧹 Removed TXT record {}", fqdn);
            }
            None => tracing::debug!("🧹 TXT record {} already gone", fqdn),
        }
        Ok(())
    }
}
