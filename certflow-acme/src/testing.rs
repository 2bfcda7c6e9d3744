//! Test doubles: a scripted CA and an in-memory DNS provider
//!
//! 🧪 Available to this crate's tests and, through the `testing` feature, to
//! dependants' tests.

use crate::account::{Account, Eab};
use crate::chain::IssuedChain;
use crate::driver::{AcmeDriver, Registration};
use crate::error::{AcmeError, AcmeResult};
use crate::key::{KeyFactory, KeyType, PrivateKey};
use crate::solver::dns::{DnsProvider, DnsProviderError, DnsResult, TxtRecord};
use crate::solver::{Challenge, ChallengeSolver, cleanup_all};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct StubState {
    /// account key PEM -> account URL
    accounts: HashMap<String, String>,
    /// certificate URL -> chain
    issued: HashMap<String, String>,
    events: Vec<String>,
    valid_domains: HashSet<String>,
    reject_registration: bool,
    fail_validation: Option<String>,
    fail_fetch: bool,
    alternate_chains: usize,
    orders: usize,
}

/// 🧪 Scripted CA: one challenge per pending domain, self-signed chains
#[derive(Default)]
pub struct StubCa {
    state: Mutex<StubState>,
}

impl StubCa {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `domain`'s authorization as already valid, so no challenge is issued
    pub fn with_valid_domain(self, domain: &str) -> Self {
        self.state.lock().valid_domains.insert(domain.to_string());
        self
    }

    pub fn with_rejected_registration(self) -> Self {
        self.state.lock().reject_registration = true;
        self
    }

    /// Fail every order at validation time with `reason`
    pub fn with_failed_validation(self, reason: &str) -> Self {
        self.state.lock().fail_validation = Some(reason.to_string());
        self
    }

    /// Make chain lookups by URL fail
    pub fn with_failing_fetch(self) -> Self {
        self.state.lock().fail_fetch = true;
        self
    }

    /// Offer `count` longer alternate chains besides the primary one
    pub fn with_alternate_chains(self, count: usize) -> Self {
        self.state.lock().alternate_chains = count;
        self
    }

    /// Everything the CA was asked to do, in order
    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    pub fn count_events(&self, prefix: &str) -> usize {
        self.state.lock().events.iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// A P-256 account already known to this CA
    pub fn account(&self) -> AcmeResult<Account> {
        let pem = KeyFactory::generate(KeyType::P256)?.to_pem()?;
        let mut state = self.state.lock();
        let url = format!("https://stub.test/acme/acct/{}", state.accounts.len() + 1);
        state.accounts.insert(pem.clone(), url.clone());
        Ok(Account {
            email: "ops@example.com".to_string(),
            directory_url: "https://stub.test/directory".to_string(),
            eab: None,
            private_key_pem: pem,
            key_type: KeyType::P256,
            account_url: url,
        })
    }

    fn event(&self, event: String) {
        self.state.lock().events.push(event);
    }
}

fn self_signed_pem(domains: &[String]) -> AcmeResult<String> {
    let certified = rcgen::generate_simple_self_signed(domains.to_vec())
        .map_err(|e| AcmeError::Issuance(format!("stub CA cannot sign: {}", e)))?;
    Ok(certified.cert.pem())
}

#[async_trait]
impl AcmeDriver for StubCa {
    async fn register(
        &self,
        directory_url: &str,
        _contact: &[String],
        key: &PrivateKey,
        eab: Option<&Eab>,
    ) -> AcmeResult<Registration> {
        // EAB accounts get a CA-side P-256 key, like instant-acme
        let key = match eab {
            Some(_) => {
                self.event(format!("register-eab {}", directory_url));
                KeyFactory::generate(KeyType::P256)?
            }
            None => {
                self.event(format!("register {}", directory_url));
                PrivateKey::from_pem(&key.to_pem()?)?
            }
        };

        let pem = key.to_pem()?;
        let mut state = self.state.lock();
        if state.reject_registration {
            return Err(AcmeError::Registration(
                "urn:ietf:params:acme:error:rejectedIdentifier".to_string(),
            ));
        }
        let account_url = format!("https://stub.test/acme/acct/{}", state.accounts.len() + 1);
        state.accounts.insert(pem, account_url.clone());
        Ok(Registration { account_url, key })
    }

    async fn lookup(&self, directory_url: &str, key: &PrivateKey) -> AcmeResult<String> {
        self.event(format!("lookup {}", directory_url));
        let pem = key.to_pem()?;
        self.state
            .lock()
            .accounts
            .get(&pem)
            .cloned()
            .ok_or_else(|| {
                AcmeError::AccountLookup(
                    "urn:ietf:params:acme:error:accountDoesNotExist".to_string(),
                )
            })
    }

    async fn issue(
        &self,
        _account: &Account,
        domains: &[String],
        _cert_key: &PrivateKey,
        solver: &dyn ChallengeSolver,
    ) -> AcmeResult<Vec<IssuedChain>> {
        let order = {
            let mut state = self.state.lock();
            state.orders += 1;
            state.orders
        };
        self.event(format!("order {}", domains.join(",")));

        let pending: Vec<String> = {
            let state = self.state.lock();
            domains.iter().filter(|d| !state.valid_domains.contains(*d)).cloned().collect()
        };

        if let Err(e) = solver.prepare(pending.len()).await {
            self.event(format!("prepare-failed: {}", e));
            return Err(e);
        }

        let mut presented = Vec::new();
        for (index, domain) in pending.iter().enumerate() {
            let token = format!("stub-token-{}-{}", order, index);
            let challenge = Challenge {
                domain: domain.clone(),
                kind: solver.kind(),
                key_authorization: format!("{}.stub-thumbprint", token),
                token,
            };
            if let Err(e) = solver.present(&challenge).await {
                self.event(format!("present-failed {}: {}", domain, e));
                cleanup_all(solver, &presented).await;
                return Err(e);
            }
            self.event(format!("present {}", domain));
            presented.push(challenge);
        }

        self.event("ready".to_string());
        let failure = self.state.lock().fail_validation.clone();
        cleanup_all(solver, &presented).await;
        for challenge in &presented {
            self.event(format!("cleanup {}", challenge.domain));
        }
        if let Some(reason) = failure {
            return Err(AcmeError::Issuance(reason));
        }

        let primary = self_signed_pem(domains)?;
        let mut chains = vec![IssuedChain {
            url: format!("https://stub.test/acme/cert/{}", order),
            chain_pem: primary.clone(),
        }];

        let alternates = self.state.lock().alternate_chains;
        for alt in 1..=alternates {
            let mut chain_pem = primary.clone();
            for _ in 0..alt {
                chain_pem.push_str(&self_signed_pem(&["intermediate.stub.test".to_string()])?);
            }
            chains.push(IssuedChain {
                url: format!("https://stub.test/acme/cert/{}/alt/{}", order, alt),
                chain_pem,
            });
        }

        let mut state = self.state.lock();
        for chain in &chains {
            state.issued.insert(chain.url.clone(), chain.chain_pem.clone());
        }
        state.events.push("finalize".to_string());
        Ok(chains)
    }

    async fn fetch_chain(&self, _account: &Account, url: &str) -> AcmeResult<String> {
        self.event(format!("fetch {}", url));
        let state = self.state.lock();
        if state.fail_fetch {
            return Err(AcmeError::Protocol(format!("GET {} returned 404", url)));
        }
        state
            .issued
            .get(url)
            .cloned()
            .ok_or_else(|| AcmeError::Protocol(format!("GET {} returned 404", url)))
    }
}

/// 💾 DNS provider keeping TXT records in memory
#[derive(Debug, Default)]
pub struct MemoryDnsProvider {
    records: Mutex<Vec<TxtRecord>>,
    create_calls: AtomicUsize,
    next_id: AtomicUsize,
    fail_on_create: bool,
}

impl MemoryDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_on_create(mut self) -> Self {
        self.fail_on_create = true;
        self
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn has_record(&self, fqdn: &str, value: &str) -> bool {
        self.records.lock().iter().any(|r| r.fqdn == fqdn && r.value == value)
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn find_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<Option<TxtRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .find(|r| r.fqdn == fqdn && r.value == value)
            .cloned())
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<TxtRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_create {
            return Err(DnsProviderError::RecordCreation {
                record_name: fqdn.to_string(),
                message: "zone is read-only".to_string(),
            });
        }
        let record = TxtRecord {
            id: format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            fqdn: fqdn.to_string(),
            value: value.to_string(),
        };
        self.records.lock().push(record.clone());
        Ok(record)
    }

    async fn delete_txt_record(&self, record: &TxtRecord) -> DnsResult<()> {
        self.records.lock().retain(|r| r.id != record.id);
        Ok(())
    }
}
