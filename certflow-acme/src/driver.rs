//! Protocol driver seam
//!
//! Everything that speaks ACME on the wire sits behind [`AcmeDriver`], so the
//! account manager and client can be exercised against a scripted CA.

use crate::account::{Account, Eab};
use crate::chain::IssuedChain;
use crate::error::AcmeResult;
use crate::key::PrivateKey;
use crate::solver::ChallengeSolver;
use async_trait::async_trait;

/// A freshly registered account
#[derive(Debug)]
pub struct Registration {
    /// Account resource URL assigned by the CA
    pub account_url: String,
    /// Key the account is bound to. Drivers may substitute their own key,
    /// so callers must store this one rather than the key they passed in.
    pub key: PrivateKey,
}

#[async_trait]
pub trait AcmeDriver: Send + Sync {
    /// Register a new account, preferably bound to `key`
    async fn register(
        &self,
        directory_url: &str,
        contact: &[String],
        key: &PrivateKey,
        eab: Option<&Eab>,
    ) -> AcmeResult<Registration>;

    /// Find the existing account bound to `key`, returning the account URL
    async fn lookup(&self, directory_url: &str, key: &PrivateKey) -> AcmeResult<String>;

    /// Order, validate and finalize a certificate covering `domains`.
    ///
    /// The number of pending challenges is passed to `solver.prepare` first.
    /// Every pending challenge is then presented through `solver` before any
    /// of them is marked ready. Presented challenges are cleaned up once the
    /// order leaves validation, whatever the result.
    async fn issue(
        &self,
        account: &Account,
        domains: &[String],
        cert_key: &PrivateKey,
        solver: &dyn ChallengeSolver,
    ) -> AcmeResult<Vec<IssuedChain>>;

    /// Download the chain behind a certificate resource URL
    async fn fetch_chain(&self, account: &Account, url: &str) -> AcmeResult<String>;
}
