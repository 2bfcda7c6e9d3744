//! 📜 Issuance results and leaf certificate inspection

use crate::error::{AcmeError, AcmeResult};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

/// 📜 Certificate data produced by obtain/renew
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Certificate private key (PEM)
    pub private_key_pem: String,
    /// Leaf plus intermediates (PEM)
    pub chain_pem: String,
    /// Issuer resource URL, used later for renewal
    pub url: String,
}

impl Certificate {
    /// Parse the leaf certificate of the chain
    pub fn info(&self) -> AcmeResult<CertificateInfo> {
        CertificateInfo::parse(&self.chain_pem)
    }
}

/// Metadata of a leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub dns_names: Vec<String>,
    pub issuer: Option<String>,
    /// Unix seconds
    pub not_before: i64,
    /// Unix seconds
    pub not_after: i64,
}

impl CertificateInfo {
    /// Parse the first certificate of a PEM bundle
    pub fn parse(chain_pem: &str) -> AcmeResult<Self> {
        let (_, pem) = parse_x509_pem(chain_pem.as_bytes())
            .map_err(|e| AcmeError::Parse(format!("invalid certificate PEM: {}", e)))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| AcmeError::Parse(format!("invalid x509 certificate: {}", e)))?;

        let issuer = cert
            .issuer()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        let mut dns_names = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                if let GeneralName::DNSName(dns) = name {
                    dns_names.push(dns.to_string());
                }
            }
        }

        let validity = cert.validity();
        Ok(Self {
            dns_names,
            issuer,
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_self_signed_leaf() {
        let names = vec!["example.com".to_string(), "www.example.com".to_string()];
        let certified = rcgen::generate_simple_self_signed(names).unwrap();
        let info = CertificateInfo::parse(&certified.cert.pem()).unwrap();

        assert_eq!(info.dns_names, vec!["example.com", "www.example.com"]);
        assert!(info.not_after > info.not_before);
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let err = CertificateInfo::parse("not a certificate").unwrap_err();
        assert!(matches!(err, AcmeError::Parse(_)));
    }
}
