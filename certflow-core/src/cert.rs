//! Certificate service
//!
//! 🔐 Resolves a certificate record into a client for its account, picks the
//! challenge solver from the record's bindings and saves the results.
//! Accounts are resumed from stored credentials on every operation. A
//! record's deploy script runs after a new issuance is saved; renewals
//! do not run it.

use crate::config::{AccountRecord, AcmeSettings, CertRecord};
use crate::deploy;
use crate::dns::DnsProviderRegistry;
use crate::error::{Error, Result};
use crate::repo::CertRepo;
use certflow_acme::{
    AccountManager, AcmeDriver, Certificate, Client, DnsRecord, RenewOutcome, SessionStore,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct CertService {
    repo: Arc<dyn CertRepo>,
    driver: Arc<dyn AcmeDriver>,
    providers: DnsProviderRegistry,
    settings: AcmeSettings,
    /// cert id -> client parked in a manual DNS session
    sessions: Arc<SessionStore<String, Arc<Client>>>,
}

impl CertService {
    pub fn new(
        repo: Arc<dyn CertRepo>,
        driver: Arc<dyn AcmeDriver>,
        settings: AcmeSettings,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(settings.session_ttl()));
        Self {
            repo,
            driver,
            providers: DnsProviderRegistry::new(),
            settings,
            sessions,
        }
    }

    pub fn with_providers(mut self, providers: DnsProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Use a specific session store (tests inject one with a manual clock)
    pub fn with_session_store(mut self, sessions: Arc<SessionStore<String, Arc<Client>>>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn settings(&self) -> &AcmeSettings {
        &self.settings
    }

    /// 🔄 Evict expired manual sessions in the background
    pub fn start_session_eviction(&self) -> JoinHandle<()> {
        self.sessions.start_eviction_task(self.settings.eviction_interval())
    }

    fn accounts(&self) -> AccountManager {
        AccountManager::new(self.driver.clone(), self.settings.timeout())
    }

    /// Resume the record's account and wrap it in a client
    async fn client(&self, record: &CertRecord) -> Result<Client> {
        let account = self.repo.account(&record.account_id).await?;
        let pem = account.private_key_pem()?.ok_or_else(|| {
            Error::Config(format!(
                "account '{}' has no key yet, register it first",
                account.id
            ))
        })?;

        let resumed = self
            .accounts()
            .resume_account(&account.email, &pem, &account.ca, account.eab.clone())
            .await?;

        Ok(Client::new(resumed, self.driver.clone())
            .with_timeout(self.settings.timeout())
            .with_session_ttl(self.settings.session_ttl()))
    }

    /// DNS provider first, then website; otherwise only manual issuance can work
    async fn select_solver(&self, client: &Client, record: &CertRecord) -> Result<()> {
        if let Some(dns_id) = &record.dns_id {
            let provider = self.repo.dns_provider(dns_id).await?;
            tracing::debug!("📡 cert '{}' uses DNS provider '{}'", record.id, provider.name);
            client.use_dns(self.providers.build(&provider)?);
            return Ok(());
        }
        if let Some(website_id) = &record.website_id {
            let website = self.repo.website(website_id).await?;
            tracing::debug!("🌐 cert '{}' uses webroot of '{}'", record.id, website.name);
            client.use_http(&website.webroot);
            return Ok(());
        }
        Err(Error::Config(format!(
            "cert '{}' has neither a DNS provider nor a website, use manual DNS issuance",
            record.id
        )))
    }

    async fn save(&self, mut record: CertRecord, certificate: &Certificate) -> Result<()> {
        record.cert_url = Some(certificate.url.clone());
        record.cert_pem = Some(certificate.chain_pem.clone());
        record.key_pem = Some(certificate.private_key_pem.clone());
        self.repo.save_cert(record).await
    }

    /// Run the record's deploy script, if any, once the certificate is saved
    async fn deploy(
        &self,
        cert_id: &str,
        script: Option<&str>,
        certificate: &Certificate,
    ) -> Result<()> {
        let Some(script) = script.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let timeout = self.settings.timeout();
        deploy::run_deploy_script(cert_id, script, certificate, timeout).await
    }

    /// 📜 Issue the certificate with the record's DNS provider or website
    pub async fn obtain_auto(&self, cert_id: &str) -> Result<Certificate> {
        let record = self.repo.cert(cert_id).await?;
        let client = self.client(&record).await?;
        self.select_solver(&client, &record).await?;

        let certificate = client.obtain_certificate(&record.domains, record.key_type).await?;
        let script = record.script.clone();
        self.save(record, &certificate).await?;
        tracing::info!("✅ cert '{}' issued", cert_id);

        self.deploy(cert_id, script.as_deref(), &certificate).await?;
        Ok(certificate)
    }

    /// 🔄 Renew a previously issued certificate
    pub async fn renew(&self, cert_id: &str) -> Result<RenewOutcome> {
        let record = self.repo.cert(cert_id).await?;
        let cert_url = record
            .cert_url
            .clone()
            .ok_or_else(|| Error::Config(format!("cert '{}' has not been issued yet", cert_id)))?;

        let client = self.client(&record).await?;
        self.select_solver(&client, &record).await?;

        let outcome = client
            .renew_certificate(&cert_url, &record.domains, record.key_type)
            .await;
        let outcome = match outcome {
            RenewOutcome::Failed(e) => return Err(e.into()),
            other => other,
        };
        if let Some(certificate) = outcome.certificate() {
            self.save(record, certificate).await?;
        }
        tracing::info!("✅ cert '{}' renewed", cert_id);
        Ok(outcome)
    }

    /// 🙋 Start a manual DNS issuance and return the records to publish
    pub async fn manual_dns(&self, cert_id: &str) -> Result<Vec<DnsRecord>> {
        let record = self.repo.cert(cert_id).await?;
        let client = Arc::new(self.client(&record).await?);
        client.use_manual_dns();

        let records = client.get_dns_records(&record.domains, record.key_type).await?;
        // A previous session for this cert is dropped, which cancels it
        self.sessions.insert(cert_id.to_string(), client);
        Ok(records)
    }

    /// 🙋 Finish a manual DNS issuance started by [`CertService::manual_dns`]
    pub async fn obtain_manual(&self, cert_id: &str) -> Result<Certificate> {
        // Look the record up first so a failure here leaves the session parked
        let record = self.repo.cert(cert_id).await?;
        let client = self.sessions.take(&cert_id.to_string())?;

        let certificate = client.obtain_certificate_manual().await?;
        let script = record.script.clone();
        self.save(record, &certificate).await?;
        tracing::info!("✅ cert '{}' issued via manual DNS", cert_id);

        self.deploy(cert_id, script.as_deref(), &certificate).await?;
        Ok(certificate)
    }

    /// 👤 Register a configured account with its CA and store the new key
    pub async fn register_account(&self, account_id: &str) -> Result<AccountRecord> {
        let mut record = self.repo.account(account_id).await?;
        if record.private_key_pem()?.is_some() {
            tracing::warn!(
                "⚠️ Account '{}' already has a key, registering a new one",
                account_id
            );
        }

        let account = self
            .accounts()
            .register_account(&record.ca, &record.email, record.key_type, record.eab.clone())
            .await?;

        record.private_key = Some(account.private_key_pem);
        record.account_url = Some(account.account_url);
        self.repo.save_account(record.clone()).await?;
        Ok(record)
    }
}
