//! Challenge solvers
//!
//! 🎯 One solver is selected per client before issuance. For each order the
//! protocol driver announces how many challenges are pending with
//! [`ChallengeSolver::prepare`], calls [`ChallengeSolver::present`] for every
//! pending authorization and [`ChallengeSolver::cleanup`] once validation has
//! finished, whatever the outcome.

pub mod dns;
pub mod hook;
pub mod http;
pub mod manual;

use crate::error::AcmeResult;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub use dns::{DnsAutoSolver, DnsProvider, DnsProviderError, DnsResult, TxtRecord};
pub use hook::HookDnsProvider;
pub use http::HttpSolver;
pub use manual::ManualDnsSolver;

/// ACME challenge types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    /// 🌐 HTTP-01 challenge (port 80)
    Http01,
    /// 📡 DNS-01 challenge
    Dns01,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Http01 => "http-01",
            ChallengeKind::Dns01 => "dns-01",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A challenge the CA asks us to answer for one authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Identifier being validated, may carry a `*.` prefix
    pub domain: String,
    pub kind: ChallengeKind,
    /// Token for HTTP-01
    pub token: String,
    /// Key authorization (`token.thumbprint`)
    pub key_authorization: String,
}

impl Challenge {
    /// DNS-01 TXT value: base64url SHA-256 digest of the key authorization
    pub fn dns_value(&self) -> String {
        let digest = Sha256::digest(self.key_authorization.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    pub fn dns_record(&self) -> DnsRecord {
        DnsRecord {
            name: dns::challenge_record_fqdn(&self.domain),
            record_type: "TXT".to_string(),
            value: self.dns_value(),
        }
    }
}

/// A DNS record the operator must publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
}

/// Callback for answering ACME challenges
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Challenge type this solver answers
    fn kind(&self) -> ChallengeKind;

    /// Reject identifiers this solver can never validate.
    ///
    /// Called before any key generation, file write or network call.
    fn validate_domains(&self, _domains: &[String]) -> AcmeResult<()> {
        Ok(())
    }

    /// Called once per order, before the first present, with the number of
    /// challenges that will be presented. Already valid authorizations are
    /// not counted.
    async fn prepare(&self, _pending: usize) -> AcmeResult<()> {
        Ok(())
    }

    /// 🚀 Make the challenge response reachable for the CA
    async fn present(&self, challenge: &Challenge) -> AcmeResult<()>;

    /// 🧹 Remove the challenge response
    async fn cleanup(&self, challenge: &Challenge) -> AcmeResult<()>;
}

/// Clean up every presented challenge, logging failures instead of returning them
pub async fn cleanup_all(solver: &dyn ChallengeSolver, challenges: &[Challenge]) {
    for challenge in challenges {
        if let Err(e) = solver.cleanup(challenge).await {
            tracing::warn!(
                "🧹 Cleanup of {} challenge for {} failed: {}",
                challenge.kind,
                challenge.domain,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(domain: &str) -> Challenge {
        Challenge {
            domain: domain.to_string(),
            kind: ChallengeKind::Dns01,
            token: "token".to_string(),
            key_authorization: "token.thumbprint".to_string(),
        }
    }

    #[test]
    fn test_dns_value_is_base64url_digest() {
        let value = challenge("example.com").dns_value();
        // 32-byte digest, unpadded base64url
        assert_eq!(value.len(), 43);
        assert!(!value.contains('+') && !value.contains('/') && !value.contains('='));
    }

    #[test]
    fn test_wildcard_record_uses_base_domain() {
        let record = challenge("*.example.com").dns_record();
        assert_eq!(record.name, "_acme-challenge.example.com");
        assert_eq!(record.record_type, "TXT");
        assert_eq!(record, challenge("example.com").dns_record());
    }

    #[test]
    fn test_dns_record_serializes_type_field() {
        let json = serde_json::to_value(challenge("a.test").dns_record()).unwrap();
        assert_eq!(json["type"], "TXT");
        assert_eq!(json["name"], "_acme-challenge.a.test");
    }
}
