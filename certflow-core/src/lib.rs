//! Certflow Core Library
//!
//! This crate provides the core functionality for Certflow, including
//! configuration management, certificate record storage and the issuance
//! service built on `certflow-acme`.

pub mod cert;
pub mod config;
pub mod deploy;
pub mod dns;
pub mod error;
pub mod repo;

pub use cert::CertService;
pub use dns::DnsProviderRegistry;
pub use error::{Error, Result};
pub use repo::{CertRepo, MemoryCertRepo};

/// Certflow version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
