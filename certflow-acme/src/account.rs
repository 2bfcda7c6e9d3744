//! ACME accounts
//!
//! 👤 Register new accounts or resume existing ones from stored credentials.
//! Nothing is persisted here; callers keep the returned [`Account`].

use crate::driver::{AcmeDriver, Registration};
use crate::error::{AcmeError, AcmeResult, with_deadline};
use crate::key::{KeyFactory, KeyType, PrivateKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// ACME directory URLs
pub mod directory {
    /// 🏭 Let's Encrypt Production - for real certificates
    pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
    /// 🧪 Let's Encrypt Staging - for testing (not trusted)
    pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
    pub const ZEROSSL: &str = "https://acme.zerossl.com/v2/DV90";
    pub const GOOGLE: &str = "https://dv.acme-v02.api.pki.goog/directory";
    pub const GOOGLE_CN: &str = "https://gts.rat.dev/directory";
    pub const BUYPASS: &str = "https://api.buypass.com/acme/directory";
    pub const SSL_COM: &str = "https://acme.ssl.com/sslcom-dv-rsa";
}

/// External account binding credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eab {
    pub kid: String,
    /// Base64url-encoded HMAC key, as handed out by the CA
    pub hmac_key: String,
}

/// Certificate authorities with a known directory
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CertificateAuthority {
    #[default]
    LetsEncrypt,
    LetsEncryptStaging,
    ZeroSsl,
    Google,
    GoogleCn,
    Buypass,
    SslCom,
    /// Any other ACME directory URL
    Custom(String),
}

impl CertificateAuthority {
    pub fn directory_url(&self) -> &str {
        match self {
            CertificateAuthority::LetsEncrypt => directory::LETS_ENCRYPT_PRODUCTION,
            CertificateAuthority::LetsEncryptStaging => directory::LETS_ENCRYPT_STAGING,
            CertificateAuthority::ZeroSsl => directory::ZEROSSL,
            CertificateAuthority::Google => directory::GOOGLE,
            CertificateAuthority::GoogleCn => directory::GOOGLE_CN,
            CertificateAuthority::Buypass => directory::BUYPASS,
            CertificateAuthority::SslCom => directory::SSL_COM,
            CertificateAuthority::Custom(url) => url,
        }
    }

    /// Whether the CA refuses registrations without external account binding
    pub fn requires_eab(&self) -> bool {
        matches!(
            self,
            CertificateAuthority::ZeroSsl
                | CertificateAuthority::Google
                | CertificateAuthority::GoogleCn
                | CertificateAuthority::SslCom
        )
    }

    /// Short configuration name, or the URL for custom directories
    pub fn name(&self) -> &str {
        match self {
            CertificateAuthority::LetsEncrypt => "letsencrypt",
            CertificateAuthority::LetsEncryptStaging => "letsencrypt-staging",
            CertificateAuthority::ZeroSsl => "zerossl",
            CertificateAuthority::Google => "google",
            CertificateAuthority::GoogleCn => "googlecn",
            CertificateAuthority::Buypass => "buypass",
            CertificateAuthority::SslCom => "sslcom",
            CertificateAuthority::Custom(url) => url,
        }
    }
}

impl fmt::Display for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CertificateAuthority {
    type Err = AcmeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ca = match s.trim().to_ascii_lowercase().as_str() {
            "letsencrypt" => CertificateAuthority::LetsEncrypt,
            "letsencrypt-staging" => CertificateAuthority::LetsEncryptStaging,
            "zerossl" => CertificateAuthority::ZeroSsl,
            "google" => CertificateAuthority::Google,
            "googlecn" => CertificateAuthority::GoogleCn,
            "buypass" => CertificateAuthority::Buypass,
            "sslcom" => CertificateAuthority::SslCom,
            _ if s.starts_with("https://") || s.starts_with("http://") => {
                CertificateAuthority::Custom(s.trim().to_string())
            }
            other => {
                return Err(AcmeError::Parse(format!("unknown certificate authority: {}", other)))
            }
        };
        Ok(ca)
    }
}

impl Serialize for CertificateAuthority {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for CertificateAuthority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 👤 An account bound to one CA
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub directory_url: String,
    pub eab: Option<Eab>,
    /// Account key (PKCS#8 PEM)
    pub private_key_pem: String,
    pub key_type: KeyType,
    /// Account resource URL assigned by the CA
    pub account_url: String,
}

impl Account {
    /// `mailto:` contact list sent to the CA
    pub fn contact(&self) -> Vec<String> {
        contact_for(&self.email)
    }

    pub fn private_key(&self) -> AcmeResult<PrivateKey> {
        PrivateKey::from_pem(&self.private_key_pem)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("directory_url", &self.directory_url)
            .field("key_type", &self.key_type)
            .field("account_url", &self.account_url)
            .finish_non_exhaustive()
    }
}

fn contact_for(email: &str) -> Vec<String> {
    if email.is_empty() {
        Vec::new()
    } else {
        vec![format!("mailto:{}", email)]
    }
}

/// 👤 Registers and resumes accounts through an [`AcmeDriver`]
#[derive(Clone)]
pub struct AccountManager {
    driver: Arc<dyn AcmeDriver>,
    timeout: Duration,
}

impl AccountManager {
    pub fn new(driver: Arc<dyn AcmeDriver>, timeout: Duration) -> Self {
        Self { driver, timeout }
    }

    /// Register a fresh account with a newly generated key.
    ///
    /// The driver may bind the account to a key of its own (EAB accounts are
    /// always P-256 with instant-acme); the returned account carries the key
    /// that was actually registered.
    pub async fn register_account(
        &self,
        ca: &CertificateAuthority,
        email: &str,
        key_type: KeyType,
        eab: Option<Eab>,
    ) -> AcmeResult<Account> {
        if ca.requires_eab() && eab.is_none() {
            return Err(AcmeError::Registration(format!(
                "{} requires external account binding (kid and hmac key)",
                ca
            )));
        }

        let key = tokio::task::spawn_blocking(move || KeyFactory::generate(key_type))
            .await
            .map_err(|e| AcmeError::Registration(format!("key generation task failed: {}", e)))??;

        let contact = contact_for(email);
        tracing::info!("👤 Registering {} account with {}", key_type, ca);

        let Registration { account_url, key } = with_deadline(
            self.timeout,
            self.driver.register(ca.directory_url(), &contact, &key, eab.as_ref()),
        )
        .await?;

        if key.key_type() != key_type {
            tracing::info!("👤 {} bound the account to a {} key", ca, key.key_type());
        }
        tracing::info!("✅ Account registered: {}", account_url);
        Ok(Account {
            email: email.to_string(),
            directory_url: ca.directory_url().to_string(),
            eab,
            private_key_pem: key.to_pem()?,
            key_type: key.key_type(),
            account_url,
        })
    }

    /// Re-bind an existing account from its stored key
    ///
    /// EAB credentials are kept on the returned account but not sent, since
    /// the binding was established at registration.
    pub async fn resume_account(
        &self,
        email: &str,
        private_key_pem: &str,
        ca: &CertificateAuthority,
        eab: Option<Eab>,
    ) -> AcmeResult<Account> {
        let key = PrivateKey::from_pem(private_key_pem)?;

        let account_url =
            with_deadline(self.timeout, self.driver.lookup(ca.directory_url(), &key)).await?;
        tracing::debug!("👤 Resumed account {} at {}", account_url, ca);

        Ok(Account {
            email: email.to_string(),
            directory_url: ca.directory_url().to_string(),
            eab,
            private_key_pem: private_key_pem.to_string(),
            key_type: key.key_type(),
            account_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubCa;

    fn manager(ca: &Arc<StubCa>) -> AccountManager {
        AccountManager::new(ca.clone(), Duration::from_secs(5))
    }

    #[test]
    fn test_ca_names_round_trip() {
        let names = [
            "letsencrypt",
            "letsencrypt-staging",
            "zerossl",
            "google",
            "googlecn",
            "buypass",
            "sslcom",
        ];
        for name in names {
            let ca: CertificateAuthority = name.parse().unwrap();
            assert_eq!(ca.name(), name);
            assert!(ca.directory_url().starts_with("https://"));
        }

        let custom: CertificateAuthority = "https://acme.internal/directory".parse().unwrap();
        assert_eq!(custom.directory_url(), "https://acme.internal/directory");
        assert!("nope".parse::<CertificateAuthority>().is_err());
    }

    #[test]
    fn test_eab_requirements() {
        assert!(CertificateAuthority::ZeroSsl.requires_eab());
        assert!(CertificateAuthority::Google.requires_eab());
        assert!(!CertificateAuthority::LetsEncrypt.requires_eab());
        assert!(!CertificateAuthority::Buypass.requires_eab());
    }

    #[tokio::test]
    async fn test_register_account() {
        let ca = Arc::new(StubCa::new());
        let account = manager(&ca)
            .register_account(
                &CertificateAuthority::LetsEncryptStaging,
                "ops@example.com",
                KeyType::P256,
                None,
            )
            .await
            .unwrap();

        assert_eq!(account.key_type, KeyType::P256);
        assert_eq!(account.contact(), vec!["mailto:ops@example.com".to_string()]);
        assert_eq!(account.directory_url, directory::LETS_ENCRYPT_STAGING);
        assert_eq!(account.private_key().unwrap().key_type(), KeyType::P256);
        assert!(ca.events().iter().any(|e| e.starts_with("register")));
    }

    #[tokio::test]
    async fn test_register_with_eab_stores_bound_key() {
        let ca = Arc::new(StubCa::new());
        let eab = Eab {
            kid: "kid-1".to_string(),
            hmac_key: "c2VjcmV0".to_string(),
        };

        let account = manager(&ca)
            .register_account(
                &CertificateAuthority::ZeroSsl,
                "ops@example.com",
                KeyType::P384,
                Some(eab.clone()),
            )
            .await
            .unwrap();

        // The CA-bound key replaces the requested one
        assert_eq!(account.key_type, KeyType::P256);
        assert_eq!(account.private_key().unwrap().key_type(), KeyType::P256);
        assert_eq!(account.eab, Some(eab));
        assert_eq!(ca.count_events("register-eab"), 1);

        let resumed = manager(&ca)
            .resume_account(
                "ops@example.com",
                &account.private_key_pem,
                &CertificateAuthority::ZeroSsl,
                None,
            )
            .await
            .unwrap();
        assert_eq!(resumed.account_url, account.account_url);
    }

    #[tokio::test]
    async fn test_rejected_registration() {
        let ca = Arc::new(StubCa::new().with_rejected_registration());
        let err = manager(&ca)
            .register_account(
                &CertificateAuthority::LetsEncrypt,
                "ops@example.com",
                KeyType::P256,
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AcmeError::Registration(ref m) if m.contains("rejectedIdentifier")));
        assert_eq!(ca.count_events("register"), 1);
    }

    #[tokio::test]
    async fn test_missing_eab_fails_before_network() {
        let ca = Arc::new(StubCa::new());
        let err = manager(&ca)
            .register_account(
                &CertificateAuthority::ZeroSsl,
                "ops@example.com",
                KeyType::P256,
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AcmeError::Registration(_)));
        assert!(ca.events().is_empty());
    }

    #[tokio::test]
    async fn test_resume_account() {
        let ca = Arc::new(StubCa::new());
        let registered = manager(&ca)
            .register_account(
                &CertificateAuthority::LetsEncrypt,
                "ops@example.com",
                KeyType::P384,
                None,
            )
            .await
            .unwrap();

        let resumed = manager(&ca)
            .resume_account(
                "ops@example.com",
                &registered.private_key_pem,
                &CertificateAuthority::LetsEncrypt,
                None,
            )
            .await
            .unwrap();
        assert_eq!(resumed, registered);
    }

    #[tokio::test]
    async fn test_resume_unknown_key() {
        let ca = Arc::new(StubCa::new());
        let pem = KeyFactory::generate(KeyType::P256).unwrap().to_pem().unwrap();

        let err = manager(&ca)
            .resume_account("ops@example.com", &pem, &CertificateAuthority::LetsEncrypt, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AcmeError::AccountLookup(_)));
    }

    #[tokio::test]
    async fn test_resume_malformed_key() {
        let ca = Arc::new(StubCa::new());
        let err = manager(&ca)
            .resume_account(
                "ops@example.com",
                "not a key",
                &CertificateAuthority::LetsEncrypt,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AcmeError::Parse(_)));
    }
}
