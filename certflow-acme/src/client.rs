//! Certificate client
//!
//! 🔐 Binds one [`Account`] to a protocol driver and a selected challenge
//! solver, and runs the obtain, renew and manual DNS pipelines on top.

use crate::account::Account;
use crate::certificate::Certificate;
use crate::chain::select_preferred_chain;
use crate::driver::AcmeDriver;
use crate::error::{AcmeError, AcmeResult, with_deadline};
use crate::key::{KeyFactory, KeyType};
use crate::session::{self, MANUAL_SESSION_TTL, ManualSession, ManualState, SessionId};
use crate::solver::dns::DnsProvider;
use crate::solver::{ChallengeSolver, DnsAutoSolver, DnsRecord, HttpSolver};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default deadline for a single driver call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Time an expired manual issuance gets to clean up after cancellation
const EXPIRY_GRACE: Duration = Duration::from_secs(5);

/// Result of a renewal
#[derive(Debug)]
pub enum RenewOutcome {
    /// The existing chain was fetched by URL and the certificate re-issued
    Renewed(Certificate),
    /// Fetching by URL failed; a fresh issuance succeeded anyway
    Reissued {
        certificate: Certificate,
        renewal_error: AcmeError,
    },
    Failed(AcmeError),
}

impl RenewOutcome {
    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            RenewOutcome::Renewed(certificate) | RenewOutcome::Reissued { certificate, .. } => {
                Some(certificate)
            }
            RenewOutcome::Failed(_) => None,
        }
    }

    /// Collapse into a plain result, dropping the suppressed renewal error
    pub fn into_result(self) -> AcmeResult<Certificate> {
        match self {
            RenewOutcome::Renewed(certificate) | RenewOutcome::Reissued { certificate, .. } => {
                Ok(certificate)
            }
            RenewOutcome::Failed(e) => Err(e),
        }
    }
}

/// Everything a background issuance needs, without a reference back to the client
#[derive(Clone)]
struct Issuance {
    driver: Arc<dyn AcmeDriver>,
    account: Account,
    solver: Arc<dyn ChallengeSolver>,
}

impl Issuance {
    async fn run(&self, domains: &[String], key_type: KeyType) -> AcmeResult<Certificate> {
        if domains.is_empty() {
            return Err(AcmeError::Issuance("no domains requested".to_string()));
        }
        self.solver.validate_domains(domains)?;

        let cert_key = tokio::task::spawn_blocking(move || KeyFactory::generate(key_type))
            .await
            .map_err(|e| AcmeError::Issuance(format!("key generation task failed: {}", e)))??;

        let chains = self
            .driver
            .issue(&self.account, domains, &cert_key, self.solver.as_ref())
            .await?;
        let chain = select_preferred_chain(chains)?;

        Ok(Certificate {
            private_key_pem: cert_key.to_pem()?,
            chain_pem: chain.chain_pem,
            url: chain.url,
        })
    }
}

/// 🔐 Certificate client for one account
pub struct Client {
    account: Account,
    driver: Arc<dyn AcmeDriver>,
    solver: RwLock<Option<Arc<dyn ChallengeSolver>>>,
    /// Operator side of the current manual session
    manual: Mutex<Option<ManualSession>>,
    /// Identity of the current manual session, kept while its operator side is in use
    live: Mutex<Option<(SessionId, CancellationToken)>>,
    timeout: Duration,
    session_ttl: Duration,
}

impl Client {
    pub fn new(account: Account, driver: Arc<dyn AcmeDriver>) -> Self {
        Self {
            account,
            driver,
            solver: RwLock::new(None),
            manual: Mutex::new(None),
            live: Mutex::new(None),
            timeout: DEFAULT_TIMEOUT,
            session_ttl: MANUAL_SESSION_TTL,
        }
    }

    /// Deadline applied to each outer network call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lifetime of a manual session's background issuance
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// 📡 Answer DNS-01 challenges through a provider API
    pub fn use_dns(&self, provider: Arc<dyn DnsProvider>) {
        self.set_solver(Arc::new(DnsAutoSolver::new(provider)));
    }

    /// 🌐 Answer HTTP-01 challenges from a site's document root
    pub fn use_http(&self, webroot: impl AsRef<Path>) {
        self.set_solver(Arc::new(HttpSolver::new(webroot)));
    }

    /// 🙋 Answer DNS-01 challenges by hand.
    ///
    /// Opens a fresh manual session; a previous one is cancelled.
    pub fn use_manual_dns(&self) {
        let (solver, session) = session::open();
        let previous = {
            let mut live = self.live.lock();
            live.replace((session.id(), session.cancellation_token()))
        };
        if let Some((id, cancel)) = previous {
            tracing::info!("🔁 Replacing manual session {}", id);
            cancel.cancel();
        }
        // The old session is dropped outside the lock
        let old = self.manual.lock().replace(session);
        drop(old);
        self.set_solver(Arc::new(solver));
    }

    /// Install any solver
    pub fn set_solver(&self, solver: Arc<dyn ChallengeSolver>) {
        tracing::debug!("🎯 Using {} solver", solver.kind());
        *self.solver.write() = Some(solver);
    }

    fn issuance(&self) -> AcmeResult<Issuance> {
        let solver = self.solver.read().clone().ok_or(AcmeError::NoSolver)?;
        Ok(Issuance {
            driver: self.driver.clone(),
            account: self.account.clone(),
            solver,
        })
    }

    /// 📜 Obtain a certificate for `domains` with a fresh `key_type` key
    pub async fn obtain_certificate(
        &self,
        domains: &[String],
        key_type: KeyType,
    ) -> AcmeResult<Certificate> {
        let issuance = self.issuance()?;
        tracing::info!("🔐 Obtain certificate for domains: {:?}", domains);
        let certificate = with_deadline(self.timeout, issuance.run(domains, key_type)).await?;
        tracing::info!("🎉 Certificate obtained for {:?}", domains);
        Ok(certificate)
    }

    /// 🔄 Renew the certificate behind `cert_url`, falling back to a fresh issuance
    pub async fn renew_certificate(
        &self,
        cert_url: &str,
        domains: &[String],
        key_type: KeyType,
    ) -> RenewOutcome {
        tracing::info!("🔄 Renewing certificate {}", cert_url);

        let fetched =
            with_deadline(self.timeout, self.driver.fetch_chain(&self.account, cert_url)).await;
        let obtained = self.obtain_certificate(domains, key_type).await;

        match (fetched, obtained) {
            (Ok(_), Ok(certificate)) => RenewOutcome::Renewed(certificate),
            (Err(renewal_error), Ok(certificate)) => {
                tracing::warn!(
                    "⚠️ Chain lookup for {} failed, issued a new certificate instead: {}",
                    cert_url,
                    renewal_error
                );
                RenewOutcome::Reissued {
                    certificate,
                    renewal_error,
                }
            }
            (fetched, Err(e)) => {
                if let Err(renewal_error) = fetched {
                    tracing::warn!(
                        "⚠️ Chain lookup for {} failed: {}",
                        cert_url,
                        renewal_error
                    );
                }
                RenewOutcome::Failed(e)
            }
        }
    }

    /// 🙋 Start the manual issuance and return the records to publish.
    ///
    /// Returns once a record is known for every domain; the issuance then
    /// waits for [`Client::obtain_certificate_manual`].
    pub async fn get_dns_records(
        &self,
        domains: &[String],
        key_type: KeyType,
    ) -> AcmeResult<Vec<DnsRecord>> {
        let issuance = self.issuance()?;
        // A session that cannot start stays in place
        let (mut session, outcome_tx) = {
            let mut manual = self.manual.lock();
            let outcome_tx = manual.as_mut().ok_or(AcmeError::SessionExpired)?.start()?;
            (manual.take().ok_or(AcmeError::SessionExpired)?, outcome_tx)
        };
        let cancel = session.cancellation_token();
        let id = session.id();

        let owned_domains = domains.to_vec();
        let ttl = self.session_ttl;
        tokio::spawn(async move {
            let run = issuance.run(&owned_domains, key_type);
            tokio::pin!(run);
            // Polling the issuance first lets a parked solver observe the cancellation
            let outcome = tokio::select! {
                biased;
                outcome = &mut run => outcome,
                _ = cancel.cancelled() => Err(AcmeError::SessionCancelled(id.to_string())),
                _ = tokio::time::sleep(ttl) => {
                    tracing::info!("⌛ Manual session {} expired", id);
                    cancel.cancel();
                    // Let the parked solver unwind and clean up
                    let _ = tokio::time::timeout(EXPIRY_GRACE, &mut run).await;
                    Err(AcmeError::SessionExpired)
                }
            };
            match &outcome {
                Ok(_) => tracing::info!("🎉 Manual session {} issued a certificate", id),
                Err(e) => tracing::info!("❌ Manual session {} ended: {}", id, e),
            }
            if outcome_tx.send(outcome).await.is_err() {
                tracing::debug!("🙋 Manual session {} was abandoned", id);
            }
        });

        tracing::info!("🙋 Manual session {} started for {:?}", id, domains);
        let records = with_deadline(self.timeout, session.collect_records(domains.len())).await;

        let current = self.live.lock().as_ref().map(|(live_id, _)| *live_id);
        if current != Some(id) {
            return Err(AcmeError::SessionCancelled(id.to_string()));
        }
        let records = records?;
        *self.manual.lock() = Some(session);
        Ok(records)
    }

    /// 🙋 Send the final trigger and wait for the certificate
    pub async fn obtain_certificate_manual(&self) -> AcmeResult<Certificate> {
        // An unstarted session is left for get_dns_records
        let session = {
            let mut manual = self.manual.lock();
            if manual.as_ref().is_none_or(|s| s.state() == ManualState::Idle) {
                return Err(AcmeError::SessionExpired);
            }
            manual.take().ok_or(AcmeError::SessionExpired)?
        };

        let id = session.id();
        tracing::info!("🙋 Triggering validation for manual session {}", id);
        let deadline = self.session_ttl + self.timeout;
        let outcome = with_deadline(deadline, session.finish()).await;

        let mut live = self.live.lock();
        if live.as_ref().is_some_and(|(live_id, _)| *live_id == id) {
            *live = None;
        }
        outcome
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some((_, cancel)) = self.live.lock().take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::PrivateKey;
    use crate::solver::{Challenge, ChallengeKind};
    use crate::testing::{MemoryDnsProvider, StubCa};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|d| d.to_string()).collect()
    }

    fn client(ca: &Arc<StubCa>) -> Client {
        Client::new(ca.account().unwrap(), ca.clone()).with_timeout(Duration::from_secs(10))
    }

    async fn wait_for_event(ca: &StubCa, prefix: &str) -> bool {
        for _ in 0..200 {
            if ca.count_events(prefix) > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_obtain_without_solver() {
        let ca = Arc::new(StubCa::new());
        let err = client(&ca)
            .obtain_certificate(&domains(&["a.test"]), KeyType::P256)
            .await
            .unwrap_err();
        assert!(matches!(err, AcmeError::NoSolver));
    }

    #[tokio::test]
    async fn test_obtain_with_dns_provider() {
        let ca = Arc::new(StubCa::new());
        let provider = Arc::new(MemoryDnsProvider::new());
        let client = client(&ca);
        client.use_dns(provider.clone());

        let certificate = client
            .obtain_certificate(&domains(&["a.test", "*.a.test"]), KeyType::P384)
            .await
            .unwrap();

        let key = PrivateKey::from_pem(&certificate.private_key_pem).unwrap();
        assert_eq!(key.key_type(), KeyType::P384);
        let info = certificate.info().unwrap();
        assert!(info.dns_names.contains(&"a.test".to_string()));
        // Both records were cleaned up
        assert_eq!(provider.create_calls(), 2);
        assert_eq!(provider.record_count(), 0);
    }

    #[tokio::test]
    async fn test_all_challenges_presented_before_ready() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca);
        client.use_dns(Arc::new(MemoryDnsProvider::new()));

        client
            .obtain_certificate(&domains(&["a.test", "b.test", "c.test"]), KeyType::P256)
            .await
            .unwrap();

        let events = ca.events();
        let ready = events.iter().position(|e| e == "ready").unwrap();
        let last_present = events.iter().rposition(|e| e.starts_with("present ")).unwrap();
        assert!(last_present < ready);
        assert_eq!(ca.count_events("cleanup "), 3);
    }

    #[tokio::test]
    async fn test_http_rejects_wildcard_before_driver() {
        let ca = Arc::new(StubCa::new());
        let dir = tempdir().unwrap();
        let client = client(&ca);
        client.use_http(dir.path());

        let err = client
            .obtain_certificate(&domains(&["example.com", "*.example.com"]), KeyType::P256)
            .await
            .unwrap_err();

        assert!(matches!(err, AcmeError::UnsupportedChallenge { .. }));
        assert_eq!(ca.count_events("order"), 0);
        assert!(!dir.path().join(".well-known").exists());
    }

    #[tokio::test]
    async fn test_failed_validation_still_cleans_up() {
        let ca = Arc::new(
            StubCa::new().with_failed_validation("urn:ietf:params:acme:error:unauthorized"),
        );
        let provider = Arc::new(MemoryDnsProvider::new());
        let client = client(&ca);
        client.use_dns(provider.clone());

        let err = client
            .obtain_certificate(&domains(&["a.test"]), KeyType::P256)
            .await
            .unwrap_err();

        assert!(matches!(err, AcmeError::Issuance(ref m) if m.contains("unauthorized")));
        assert_eq!(provider.record_count(), 0);
    }

    #[tokio::test]
    async fn test_shortest_chain_wins() {
        let ca = Arc::new(StubCa::new().with_alternate_chains(2));
        let client = client(&ca);
        client.use_dns(Arc::new(MemoryDnsProvider::new()));

        let certificate = client
            .obtain_certificate(&domains(&["a.test"]), KeyType::P256)
            .await
            .unwrap();
        assert!(!certificate.url.contains("/alt/"));
    }

    #[tokio::test]
    async fn test_renew_fetches_then_reissues() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca);
        client.use_dns(Arc::new(MemoryDnsProvider::new()));
        let names = domains(&["a.test"]);

        let first = client.obtain_certificate(&names, KeyType::P256).await.unwrap();
        let outcome = client.renew_certificate(&first.url, &names, KeyType::P256).await;

        assert!(matches!(outcome, RenewOutcome::Renewed(_)));
        let renewed = outcome.into_result().unwrap();
        assert_ne!(renewed.url, first.url);
        assert_eq!(ca.count_events("order"), 2);
    }

    #[tokio::test]
    async fn test_renew_falls_back_when_lookup_fails() {
        let ca = Arc::new(StubCa::new().with_failing_fetch());
        let client = client(&ca);
        client.use_dns(Arc::new(MemoryDnsProvider::new()));

        let outcome = client
            .renew_certificate(
                "https://stub.test/acme/cert/missing",
                &domains(&["a.test"]),
                KeyType::P256,
            )
            .await;

        match outcome {
            RenewOutcome::Reissued { certificate, renewal_error } => {
                assert!(!certificate.private_key_pem.is_empty());
                assert!(!certificate.chain_pem.is_empty());
                assert!(matches!(renewal_error, AcmeError::Protocol(_)));
            }
            other => panic!("expected a reissue, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_renew_failure_when_issuance_fails() {
        let ca = Arc::new(StubCa::new().with_failing_fetch().with_failed_validation("rateLimited"));
        let client = client(&ca);
        client.use_dns(Arc::new(MemoryDnsProvider::new()));

        let outcome = client
            .renew_certificate(
                "https://stub.test/acme/cert/1",
                &domains(&["a.test"]),
                KeyType::P256,
            )
            .await;
        assert!(matches!(outcome, RenewOutcome::Failed(AcmeError::Issuance(_))));
    }

    #[tokio::test]
    async fn test_manual_without_session_is_expired() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca);

        assert!(matches!(client.obtain_certificate_manual().await, Err(AcmeError::SessionExpired)));

        // Selecting manual mode without collecting records is still no session
        client.use_manual_dns();
        assert!(matches!(client.obtain_certificate_manual().await, Err(AcmeError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_manual_end_to_end() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca);
        client.use_manual_dns();

        let records = client
            .get_dns_records(&domains(&["x.test", "y.test"]), KeyType::P256)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "_acme-challenge.x.test");
        assert_eq!(records[1].name, "_acme-challenge.y.test");
        assert!(records.iter().all(|r| r.record_type == "TXT"));
        // The CA has not been told anything is ready yet
        assert_eq!(ca.count_events("ready"), 0);

        let certificate = client.obtain_certificate_manual().await.unwrap();
        assert!(!certificate.private_key_pem.is_empty());
        assert!(!certificate.chain_pem.is_empty());
        assert_eq!(ca.count_events("finalize"), 1);

        // Single shot
        assert!(matches!(client.obtain_certificate_manual().await, Err(AcmeError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_manual_acknowledges_all_but_last_record() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca);
        client.use_manual_dns();

        let records = client
            .get_dns_records(&domains(&["a.test", "b.test", "c.test"]), KeyType::P256)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);

        {
            let manual = client.manual.lock();
            let session = manual.as_ref().unwrap();
            assert_eq!(session.acknowledgments(), 2);
            assert_eq!(session.state(), ManualState::AllPublished);
        }
        // Third challenge is still parked on its acknowledgment
        assert_eq!(ca.count_events("present "), 2);

        client.obtain_certificate_manual().await.unwrap();
        assert_eq!(ca.count_events("present "), 3);
    }

    #[tokio::test]
    async fn test_manual_with_already_valid_authorization() {
        let ca = Arc::new(StubCa::new().with_valid_domain("c.test"));
        let client = client(&ca);
        client.use_manual_dns();

        let records = client
            .get_dns_records(&domains(&["a.test", "b.test", "c.test"]), KeyType::P256)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        {
            let manual = client.manual.lock();
            assert_eq!(manual.as_ref().unwrap().acknowledgments(), 1);
        }
        // The last pending record still waits for the trigger
        assert_eq!(ca.count_events("present "), 1);
        assert_eq!(ca.count_events("ready"), 0);
        assert_eq!(ca.count_events("finalize"), 0);

        let certificate = client.obtain_certificate_manual().await.unwrap();
        assert!(!certificate.chain_pem.is_empty());
        assert_eq!(ca.count_events("present "), 2);
        assert_eq!(ca.count_events("ready"), 1);
    }

    #[tokio::test]
    async fn test_manual_with_nothing_pending() {
        let ca = Arc::new(StubCa::new().with_valid_domain("a.test"));
        let client = client(&ca);
        client.use_manual_dns();

        let records = client
            .get_dns_records(&domains(&["a.test"]), KeyType::P256)
            .await
            .unwrap();
        assert!(records.is_empty());

        let certificate = client.obtain_certificate_manual().await.unwrap();
        assert!(!certificate.chain_pem.is_empty());
        assert_eq!(ca.count_events("present"), 0);
    }

    #[tokio::test]
    async fn test_trigger_after_session_ttl_is_expired() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca).with_session_ttl(Duration::from_millis(200));
        client.use_manual_dns();

        client
            .get_dns_records(&domains(&["a.test", "b.test"]), KeyType::P256)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let err = client.obtain_certificate_manual().await.unwrap_err();
        assert!(matches!(err, AcmeError::SessionExpired));
        assert_eq!(ca.count_events("finalize"), 0);
    }

    #[tokio::test]
    async fn test_session_ttl_releases_parked_solver() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca).with_session_ttl(Duration::from_millis(200));
        client.use_manual_dns();

        client
            .get_dns_records(&domains(&["a.test", "b.test"]), KeyType::P256)
            .await
            .unwrap();

        // Nobody triggers; the deadline alone ends the issuance
        assert!(wait_for_event(&ca, "present-failed b.test").await);
        assert_eq!(ca.count_events("present b.test"), 0);
        assert_eq!(ca.count_events("ready"), 0);
    }

    #[tokio::test]
    async fn test_early_trigger_keeps_unstarted_session() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca);
        client.use_manual_dns();

        assert!(matches!(client.obtain_certificate_manual().await, Err(AcmeError::SessionExpired)));

        let records = client
            .get_dns_records(&domains(&["a.test"]), KeyType::P256)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        client.obtain_certificate_manual().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_collect_keeps_started_session() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca);
        client.use_manual_dns();
        let names = domains(&["a.test", "b.test"]);

        client.get_dns_records(&names, KeyType::P256).await.unwrap();
        let err = client.get_dns_records(&names, KeyType::P256).await.unwrap_err();
        assert!(matches!(err, AcmeError::Solver(_)));

        client.obtain_certificate_manual().await.unwrap();
        assert_eq!(ca.count_events("finalize"), 1);
    }

    #[tokio::test]
    async fn test_manual_early_failure_surfaces() {
        let ca = Arc::new(StubCa::new());
        let dir = tempdir().unwrap();
        let client = client(&ca);
        client.use_manual_dns();
        // Manual mode switched away before records were collected
        client.use_http(dir.path());

        let err = client
            .get_dns_records(&domains(&["*.a.test"]), KeyType::P256)
            .await
            .unwrap_err();
        assert!(matches!(err, AcmeError::UnsupportedChallenge { .. }));
    }

    #[tokio::test]
    async fn test_replacing_session_releases_parked_solver() {
        let ca = Arc::new(StubCa::new());
        let client = client(&ca);
        client.use_manual_dns();

        client
            .get_dns_records(&domains(&["a.test", "b.test"]), KeyType::P256)
            .await
            .unwrap();
        assert_eq!(ca.count_events("present "), 1);

        client.use_manual_dns();

        assert!(wait_for_event(&ca, "present-failed b.test").await);
        let events = ca.events();
        let failed = events.iter().find(|e| e.starts_with("present-failed")).unwrap();
        assert!(failed.contains("cancelled"));
        // The parked call never got its acknowledgment
        assert_eq!(ca.count_events("present b.test"), 0);
        assert_eq!(ca.count_events("ready"), 0);

        // The replacement starts clean
        let records = client
            .get_dns_records(&domains(&["c.test"]), KeyType::P256)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        client.obtain_certificate_manual().await.unwrap();
    }

    /// Solver that counts calls and never finishes presenting
    struct StallingSolver {
        presents: AtomicUsize,
    }

    #[async_trait]
    impl ChallengeSolver for StallingSolver {
        fn kind(&self) -> ChallengeKind {
            ChallengeKind::Dns01
        }

        async fn present(&self, _challenge: &Challenge) -> AcmeResult<()> {
            self.presents.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn cleanup(&self, _challenge: &Challenge) -> AcmeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_obtain_honours_deadline() {
        let ca = Arc::new(StubCa::new());
        let client = Client::new(ca.account().unwrap(), ca.clone())
            .with_timeout(Duration::from_millis(50));
        let solver = Arc::new(StallingSolver {
            presents: AtomicUsize::new(0),
        });
        client.set_solver(solver.clone());

        let err = client
            .obtain_certificate(&domains(&["a.test"]), KeyType::P256)
            .await
            .unwrap_err();
        assert!(matches!(err, AcmeError::Timeout(_)));
        assert_eq!(solver.presents.load(Ordering::SeqCst), 1);
    }
}
