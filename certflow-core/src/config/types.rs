//! Configuration type definitions
//!
//! These types represent the runtime configuration for Certflow: the
//! engine settings plus the account, website, DNS provider and certificate
//! records the service works on.

use crate::error::{Error, Result};
use certflow_acme::{CertificateAuthority, Eab, KeyType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for Certflow
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Global logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Issuance engine settings
    #[serde(default)]
    pub acme: AcmeSettings,

    #[serde(default)]
    pub accounts: Vec<AccountRecord>,

    #[serde(default)]
    pub websites: Vec<WebsiteRecord>,

    #[serde(default)]
    pub dns_providers: Vec<DnsProviderRecord>,

    #[serde(default)]
    pub certs: Vec<CertRecord>,
}

impl AppConfig {
    /// Check that every reference between records resolves
    pub fn validate(&self) -> Result<()> {
        let accounts = unique_ids("account", self.accounts.iter().map(|a| a.id.as_str()))?;
        let websites = unique_ids("website", self.websites.iter().map(|w| w.id.as_str()))?;
        let providers =
            unique_ids("dns provider", self.dns_providers.iter().map(|d| d.id.as_str()))?;
        unique_ids("cert", self.certs.iter().map(|c| c.id.as_str()))?;

        for cert in &self.certs {
            if cert.domains.is_empty() || cert.domains.iter().any(|d| d.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "cert '{}' needs at least one non-empty domain",
                    cert.id
                )));
            }
            if !accounts.contains(cert.account_id.as_str()) {
                return Err(Error::Config(format!(
                    "cert '{}' references unknown account '{}'",
                    cert.id, cert.account_id
                )));
            }
            if let Some(website) = &cert.website_id {
                if !websites.contains(website.as_str()) {
                    return Err(Error::Config(format!(
                        "cert '{}' references unknown website '{}'",
                        cert.id, website
                    )));
                }
            }
            if let Some(dns) = &cert.dns_id {
                if !providers.contains(dns.as_str()) {
                    return Err(Error::Config(format!(
                        "cert '{}' references unknown dns provider '{}'",
                        cert.id, dns
                    )));
                }
            }
        }

        for account in &self.accounts {
            if account.ca.requires_eab() && account.eab.is_none() {
                tracing::warn!(
                    "⚠️ Account '{}' uses {} without EAB credentials",
                    account.id,
                    account.ca
                );
            }
        }
        Ok(())
    }
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(Error::Config(format!("duplicate {} id '{}'", kind, id)));
        }
    }
    Ok(seen)
}

/// Global logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (compact, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

/// Issuance engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeSettings {
    /// Deadline for each outer network call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long a started manual DNS session is retained
    #[serde(default = "default_session_ttl_secs")]
    pub manual_session_ttl_secs: u64,

    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    /// Where issued certificates are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl AcmeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.manual_session_ttl_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs.max(1))
    }
}

impl Default for AcmeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            manual_session_ttl_secs: default_session_ttl_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_session_ttl_secs() -> u64 {
    15 * 60
}

fn default_eviction_interval_secs() -> u64 {
    60
}

fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("certflow")
        .join("certs")
}

/// Stored account credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,

    pub email: String,

    #[serde(default)]
    pub ca: CertificateAuthority,

    /// Account key type used at registration
    #[serde(default)]
    pub key_type: KeyType,

    #[serde(default)]
    pub eab: Option<Eab>,

    /// Account key (PEM), set once registered
    #[serde(default)]
    pub private_key: Option<String>,

    /// File holding the account key, read when `private_key` is unset
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,

    #[serde(default)]
    pub account_url: Option<String>,
}

impl AccountRecord {
    /// The stored account key, inline or from `private_key_file`
    pub fn private_key_pem(&self) -> Result<Option<String>> {
        if let Some(pem) = &self.private_key {
            return Ok(Some(pem.clone()));
        }
        match &self.private_key_file {
            Some(path) if path.exists() => Ok(Some(std::fs::read_to_string(path)?)),
            _ => Ok(None),
        }
    }
}

/// A site whose document root can serve HTTP-01 challenges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteRecord {
    pub id: String,
    pub name: String,
    pub webroot: PathBuf,
}

/// A DNS provider able to host DNS-01 records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsProviderRecord {
    pub id: String,
    pub name: String,
    /// Provider implementation (e.g., "hook")
    pub kind: String,
    /// Provider specific settings
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// A certificate to issue, with the results of the last issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertRecord {
    pub id: String,

    pub account_id: String,

    /// Website used for HTTP-01
    #[serde(default)]
    pub website_id: Option<String>,

    /// DNS provider used for DNS-01, preferred over the website
    #[serde(default)]
    pub dns_id: Option<String>,

    #[serde(default)]
    pub key_type: KeyType,

    pub domains: Vec<String>,

    /// Certificate resource URL of the last issuance
    #[serde(default)]
    pub cert_url: Option<String>,

    #[serde(default)]
    pub cert_pem: Option<String>,

    #[serde(default)]
    pub key_pem: Option<String>,

    /// Shell script run after each issuance. `{cert}` and `{key}` expand to the PEMs
    #[serde(default)]
    pub script: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        toml::from_str(
            r#"
            [[accounts]]
            id = "le"
            email = "ops@example.com"
            ca = "letsencrypt-staging"

            [[websites]]
            id = "blog"
            name = "blog.example.com"
            webroot = "/var/www/blog"

            [[dns_providers]]
            id = "hook"
            name = "zone hook"
            kind = "hook"
            settings = { program = "/usr/local/bin/dns-hook" }

            [[certs]]
            id = "blog"
            account_id = "le"
            website_id = "blog"
            domains = ["blog.example.com"]

            [[certs]]
            id = "wild"
            account_id = "le"
            dns_id = "hook"
            key_type = "4096"
            domains = ["example.com", "*.example.com"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = sample();
        assert_eq!(config.acme.timeout_secs, 120);
        assert_eq!(config.acme.session_ttl(), Duration::from_secs(900));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.accounts[0].key_type, KeyType::P256);
        assert_eq!(config.accounts[0].ca, CertificateAuthority::LetsEncryptStaging);
        assert_eq!(config.certs[1].key_type, KeyType::Rsa4096);
    }

    #[test]
    fn test_validate_ok() {
        sample().validate().unwrap();
    }

    #[test]
    fn test_validate_unknown_references() {
        let mut config = sample();
        config.certs[0].account_id = "missing".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(m)) if m.contains("missing")));

        let mut config = sample();
        config.certs[1].dns_id = Some("nope".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_domains_and_duplicates() {
        let mut config = sample();
        config.certs[0].domains.clear();
        assert!(config.validate().is_err());

        let mut config = sample();
        let duplicate = config.accounts[0].clone();
        config.accounts.push(duplicate);
        assert!(matches!(config.validate(), Err(Error::Config(m)) if m.contains("duplicate")));
    }

    #[test]
    fn test_account_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("le.key");
        std::fs::write(&path, "PEM").unwrap();

        let mut account = sample().accounts.remove(0);
        assert_eq!(account.private_key_pem().unwrap(), None);

        account.private_key_file = Some(path);
        assert_eq!(account.private_key_pem().unwrap().as_deref(), Some("PEM"));

        account.private_key = Some("INLINE".to_string());
        assert_eq!(account.private_key_pem().unwrap().as_deref(), Some("INLINE"));
    }
}
