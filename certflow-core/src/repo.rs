//! Record storage
//!
//! 💾 [`CertRepo`] is what the service reads records from and saves
//! issuance results to. [`MemoryCertRepo`] keeps everything in memory,
//! seeded from the loaded configuration.

use crate::config::{AccountRecord, AppConfig, CertRecord, DnsProviderRecord, WebsiteRecord};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[async_trait]
pub trait CertRepo: Send + Sync {
    async fn cert(&self, id: &str) -> Result<CertRecord>;
    async fn save_cert(&self, record: CertRecord) -> Result<()>;
    async fn account(&self, id: &str) -> Result<AccountRecord>;
    async fn save_account(&self, record: AccountRecord) -> Result<()>;
    async fn website(&self, id: &str) -> Result<WebsiteRecord>;
    async fn dns_provider(&self, id: &str) -> Result<DnsProviderRecord>;
}

/// 💾 In-memory record store
#[derive(Default)]
pub struct MemoryCertRepo {
    certs: RwLock<HashMap<String, CertRecord>>,
    accounts: RwLock<HashMap<String, AccountRecord>>,
    websites: RwLock<HashMap<String, WebsiteRecord>>,
    dns_providers: RwLock<HashMap<String, DnsProviderRecord>>,
}

impl MemoryCertRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let repo = Self::new();
        repo.extend(config);
        repo
    }

    /// Add (or overwrite) every record of `config`
    pub fn extend(&self, config: &AppConfig) {
        self.certs
            .write()
            .extend(config.certs.iter().map(|r| (r.id.clone(), r.clone())));
        self.accounts
            .write()
            .extend(config.accounts.iter().map(|r| (r.id.clone(), r.clone())));
        self.websites
            .write()
            .extend(config.websites.iter().map(|r| (r.id.clone(), r.clone())));
        self.dns_providers
            .write()
            .extend(config.dns_providers.iter().map(|r| (r.id.clone(), r.clone())));
    }
}

fn lookup<T: Clone>(map: &RwLock<HashMap<String, T>>, kind: &str, id: &str) -> Result<T> {
    map.read()
        .get(id)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("{} '{}'", kind, id)))
}

#[async_trait]
impl CertRepo for MemoryCertRepo {
    async fn cert(&self, id: &str) -> Result<CertRecord> {
        lookup(&self.certs, "cert", id)
    }

    async fn save_cert(&self, record: CertRecord) -> Result<()> {
        self.certs.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn account(&self, id: &str) -> Result<AccountRecord> {
        lookup(&self.accounts, "account", id)
    }

    async fn save_account(&self, record: AccountRecord) -> Result<()> {
        self.accounts.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn website(&self, id: &str) -> Result<WebsiteRecord> {
        lookup(&self.websites, "website", id)
    }

    async fn dns_provider(&self, id: &str) -> Result<DnsProviderRecord> {
        lookup(&self.dns_providers, "dns provider", id)
    }
}
