//! Certflow ACME Module
//!
//! Certificate issuance over ACME including:
//! - Account registration and resumption
//! - Challenge solvers (DNS-01 via provider, manual DNS-01, HTTP-01)
//! - Obtain / renew pipeline with preferred chain selection
//! - Time-bounded manual DNS sessions

pub mod account;
pub mod certificate;
pub mod chain;
pub mod client;
pub mod driver;
pub mod error;
pub mod instant;
pub mod key;
pub mod session;
pub mod solver;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use account::{Account, AccountManager, CertificateAuthority, Eab};
pub use certificate::{Certificate, CertificateInfo};
pub use chain::{IssuedChain, select_preferred_chain};
pub use client::{Client, RenewOutcome};
pub use driver::{AcmeDriver, Registration};
pub use error::{AcmeError, AcmeResult};
pub use instant::InstantAcmeDriver;
pub use key::{KeyFactory, KeyType, PrivateKey};
pub use session::{Clock, ManualClock, ManualState, SessionId, SessionStore, SystemClock};
pub use solver::{ChallengeKind, ChallengeSolver, DnsProvider, DnsRecord, HookDnsProvider};
