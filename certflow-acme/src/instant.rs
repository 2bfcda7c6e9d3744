//! ACME protocol driver backed by instant-acme
//!
//! 🔐 instant-acme handles JWS signing, nonces and polling. Account keys must
//! be ECDSA P-256, which is the only algorithm it signs requests with.
//!
//! instant-acme cannot bind a caller-supplied key with external account
//! binding. EAB registrations therefore use a key instant-acme generates
//! (always P-256), which is read back out of the account credentials.

use crate::account::{Account, Eab};
use crate::chain::IssuedChain;
use crate::driver::{AcmeDriver, Registration};
use crate::error::{AcmeError, AcmeResult};
use crate::key::{KeyType, PrivateKey};
use crate::solver::{Challenge, ChallengeKind, ChallengeSolver, cleanup_all};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use instant_acme::{
    AuthorizationStatus, ChallengeType as AcmeChallengeType, ExternalAccountKey, Identifier, Key,
    NewAccount, NewOrder, OrderStatus, RetryPolicy,
};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

/// PEM chain media type for certificate downloads
const PEM_CHAIN_CONTENT_TYPE: &str = "application/pem-certificate-chain";

pub struct InstantAcmeDriver {
    http: reqwest::Client,
}

impl InstantAcmeDriver {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn account_handle(&self, account: &Account) -> AcmeResult<instant_acme::Account> {
        let key = PrivateKey::from_pem(&account.private_key_pem)?;
        let signing_key = signing_key(&key).map_err(|e| AcmeError::AccountLookup(e.to_string()))?;
        let (handle, _credentials) = instant_acme::Account::builder()?
            .from_key(signing_key, account.directory_url.clone())
            .await
            .map_err(|e| AcmeError::AccountLookup(e.to_string()))?;
        Ok(handle)
    }
}

impl Default for InstantAcmeDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn signing_key(key: &PrivateKey) -> AcmeResult<(Key, PrivateKeyDer<'static>)> {
    if key.key_type() != KeyType::P256 {
        return Err(AcmeError::UnsupportedKeyType(format!(
            "{} account keys are not supported, use P256",
            key.key_type()
        )));
    }

    let der = key.to_pkcs8_der()?;
    let signing = Key::from_pkcs8_der(PrivatePkcs8KeyDer::from(der.as_slice()))?;
    Ok((signing, PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der))))
}

fn external_account_key(eab: &Eab) -> AcmeResult<ExternalAccountKey> {
    let hmac = URL_SAFE_NO_PAD
        .decode(eab.hmac_key.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(&eab.hmac_key))
        .map_err(|e| AcmeError::Registration(format!("invalid EAB hmac key: {}", e)))?;
    Ok(ExternalAccountKey::new(eab.kid.clone(), &hmac))
}

/// Recover the account key from serialized instant-acme credentials
fn credentials_key(credentials: &serde_json::Value) -> AcmeResult<PrivateKey> {
    let encoded = credentials
        .get("key_pkcs8")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| AcmeError::Registration("account credentials carry no key".to_string()))?;
    let der = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(encoded))
        .map_err(|e| AcmeError::Registration(format!("invalid account key encoding: {}", e)))?;
    PrivateKey::from_pkcs8_der(&der)
}

fn acme_challenge_type(kind: ChallengeKind) -> AcmeChallengeType {
    match kind {
        ChallengeKind::Http01 => AcmeChallengeType::Http01,
        ChallengeKind::Dns01 => AcmeChallengeType::Dns01,
    }
}

#[async_trait]
impl AcmeDriver for InstantAcmeDriver {
    async fn register(
        &self,
        directory_url: &str,
        contact: &[String],
        key: &PrivateKey,
        eab: Option<&Eab>,
    ) -> AcmeResult<Registration> {
        let builder = instant_acme::Account::builder()?;

        let Some(eab) = eab else {
            let signing_key =
                signing_key(key).map_err(|e| AcmeError::Registration(e.to_string()))?;
            if !contact.is_empty() {
                tracing::debug!("👤 Contacts are not sent for key-bound registrations");
            }
            let (account, _credentials) = builder
                .create_from_key(signing_key, directory_url.to_string())
                .await
                .map_err(|e| AcmeError::Registration(e.to_string()))?;
            return Ok(Registration {
                account_url: account.id().to_string(),
                key: PrivateKey::from_pkcs8_der(&key.to_pkcs8_der()?)?,
            });
        };

        let eab = external_account_key(eab)?;
        let contact_refs: Vec<&str> = contact.iter().map(String::as_str).collect();
        let new_account = NewAccount {
            contact: &contact_refs,
            terms_of_service_agreed: true,
            only_return_existing: false,
        };

        let (account, credentials) = builder
            .create(&new_account, directory_url.to_string(), Some(&eab))
            .await
            .map_err(|e| AcmeError::Registration(e.to_string()))?;
        let credentials = serde_json::to_value(&credentials)
            .map_err(|e| AcmeError::Registration(format!("unreadable credentials: {}", e)))?;

        tracing::info!("👤 EAB account is bound to a new P256 key");
        Ok(Registration {
            account_url: account.id().to_string(),
            key: credentials_key(&credentials)?,
        })
    }

    async fn lookup(&self, directory_url: &str, key: &PrivateKey) -> AcmeResult<String> {
        let signing_key = signing_key(key).map_err(|e| AcmeError::AccountLookup(e.to_string()))?;
        let (account, _credentials) = instant_acme::Account::builder()?
            .from_key(signing_key, directory_url.to_string())
            .await
            .map_err(|e| AcmeError::AccountLookup(e.to_string()))?;
        Ok(account.id().to_string())
    }

    async fn issue(
        &self,
        account: &Account,
        domains: &[String],
        cert_key: &PrivateKey,
        solver: &dyn ChallengeSolver,
    ) -> AcmeResult<Vec<IssuedChain>> {
        let handle = self.account_handle(account).await?;
        let kind = solver.kind();

        let identifiers: Vec<Identifier> =
            domains.iter().map(|d| Identifier::Dns(d.clone())).collect();
        tracing::info!("📝 Creating certificate order for {:?}", domains);
        let mut order = handle
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| AcmeError::Issuance(format!("failed to create order: {}", e)))?;

        let mut pending = 0;
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            if result?.status != AuthorizationStatus::Valid {
                pending += 1;
            }
        }
        drop(authorizations);
        solver.prepare(pending).await?;

        // Present everything first; the CA may validate as soon as one is ready.
        let mut presented: Vec<Challenge> = Vec::new();
        let presenting: AcmeResult<()> = async {
            let mut authorizations = order.authorizations();
            while let Some(result) = authorizations.next().await {
                let mut authz = result?;
                if authz.status == AuthorizationStatus::Valid {
                    tracing::info!("✅ Authorization for {} already valid", authz.identifier());
                    continue;
                }

                let domain = authz.identifier().to_string();
                let challenge = authz.challenge(acme_challenge_type(kind)).ok_or_else(|| {
                    AcmeError::UnsupportedChallenge {
                        domain: domain.clone(),
                        challenge: kind.to_string(),
                    }
                })?;

                let challenge = Challenge {
                    domain,
                    kind,
                    token: challenge.token.clone(),
                    key_authorization: challenge.key_authorization().as_str().to_string(),
                };
                solver.present(&challenge).await?;
                tracing::info!("🚀 {} challenge presented for {}", kind, challenge.domain);
                presented.push(challenge);
            }
            Ok::<(), AcmeError>(())
        }
        .await;

        if let Err(e) = presenting {
            cleanup_all(solver, &presented).await;
            return Err(e);
        }

        let validation: AcmeResult<OrderStatus> = async {
            let mut authorizations = order.authorizations();
            while let Some(result) = authorizations.next().await {
                let mut authz = result?;
                if authz.status != AuthorizationStatus::Pending {
                    continue;
                }
                if let Some(mut challenge) = authz.challenge(acme_challenge_type(kind)) {
                    challenge.set_ready().await?;
                }
            }

            tracing::info!("⏳ Waiting for order to become ready...");
            Ok::<OrderStatus, AcmeError>(order.poll_ready(&RetryPolicy::default()).await?)
        }
        .await;

        cleanup_all(solver, &presented).await;

        match validation? {
            OrderStatus::Ready => {}
            status => {
                return Err(AcmeError::Issuance(format!(
                    "order for {:?} is {:?} after validation",
                    domains, status
                )));
            }
        }

        tracing::info!("🔧 Finalizing order...");
        let csr = cert_key.csr_der(domains)?;
        order
            .finalize_csr(&csr)
            .await
            .map_err(|e| AcmeError::Issuance(format!("failed to finalize order: {}", e)))?;

        let chain_pem = order
            .poll_certificate(&RetryPolicy::default())
            .await
            .map_err(|e| AcmeError::Issuance(format!("failed to download certificate: {}", e)))?;

        let url = order.state().certificate.clone().unwrap_or_default();
        tracing::info!("🎉 Certificate issued for {:?}", domains);
        Ok(vec![IssuedChain { url, chain_pem }])
    }

    /// Plain GET of the certificate URL.
    ///
    /// instant-acme does not expose POST-as-GET for arbitrary URLs, so CAs
    /// that enforce RFC 8555 §7.4.2 reject this and renewals fall back to a
    /// fresh issuance.
    async fn fetch_chain(&self, _account: &Account, url: &str) -> AcmeResult<String> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, PEM_CHAIN_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| AcmeError::Protocol(format!("certificate download failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AcmeError::Protocol(format!("certificate download failed: {}", e)))?;

        let chain_pem = response
            .text()
            .await
            .map_err(|e| AcmeError::Protocol(format!("certificate download failed: {}", e)))?;

        crate::certificate::CertificateInfo::parse(&chain_pem)?;
        Ok(chain_pem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyFactory;

    #[test]
    fn test_only_p256_account_keys_sign() {
        let p256 = KeyFactory::generate(KeyType::P256).unwrap();
        assert!(signing_key(&p256).is_ok());

        let p384 = KeyFactory::generate(KeyType::P384).unwrap();
        assert!(matches!(signing_key(&p384), Err(AcmeError::UnsupportedKeyType(_))));
    }

    #[test]
    fn test_eab_account_key_read_from_credentials() {
        let key = KeyFactory::generate(KeyType::P256).unwrap();
        let credentials = serde_json::json!({
            "id": "https://ca.test/acme/acct/1",
            "key_pkcs8": URL_SAFE_NO_PAD.encode(key.to_pkcs8_der().unwrap()),
            "directory": "https://ca.test/directory",
        });

        let restored = credentials_key(&credentials).unwrap();
        assert_eq!(restored, key);
        assert!(signing_key(&restored).is_ok());
    }

    #[test]
    fn test_credentials_without_key_are_rejected() {
        let credentials = serde_json::json!({ "id": "https://ca.test/acme/acct/1" });
        assert!(matches!(credentials_key(&credentials), Err(AcmeError::Registration(_))));

        let garbled = serde_json::json!({ "key_pkcs8": "***" });
        assert!(matches!(credentials_key(&garbled), Err(AcmeError::Registration(_))));
    }

    #[test]
    fn test_eab_hmac_decoding() {
        let eab = Eab {
            kid: "kid-1".to_string(),
            hmac_key: URL_SAFE_NO_PAD.encode(b"0123456789abcdef0123456789abcdef"),
        };
        assert!(external_account_key(&eab).is_ok());

        let bad = Eab {
            kid: "kid-1".to_string(),
            hmac_key: "***".to_string(),
        };
        assert!(matches!(external_account_key(&bad), Err(AcmeError::Registration(_))));
    }
}
