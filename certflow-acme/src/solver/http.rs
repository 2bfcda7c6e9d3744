//! HTTP-01 challenge files
//!
//! 🌐 Writes `<webroot>/.well-known/acme-challenge/<token>` for the site's
//! web server to serve, and removes it after validation.

use super::{Challenge, ChallengeKind, ChallengeSolver};
use crate::error::{AcmeError, AcmeResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_DIR: &str = ".well-known/acme-challenge";

#[derive(Debug, Clone)]
pub struct HttpSolver {
    webroot: PathBuf,
}

impl HttpSolver {
    /// Serve challenges from the site's document root
    pub fn new(webroot: impl AsRef<Path>) -> Self {
        Self {
            webroot: webroot.as_ref().to_path_buf(),
        }
    }

    /// Path of the response file for `token`
    pub fn challenge_path(&self, token: &str) -> AcmeResult<PathBuf> {
        // Tokens are base64url; anything else could escape the webroot.
        let valid = !token.is_empty()
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(AcmeError::Solver(format!("invalid HTTP-01 token: {:?}", token)));
        }
        Ok(self.webroot.join(ACME_CHALLENGE_DIR).join(token))
    }
}

#[async_trait]
impl ChallengeSolver for HttpSolver {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Http01
    }

    fn validate_domains(&self, domains: &[String]) -> AcmeResult<()> {
        match domains.iter().find(|d| d.contains('*')) {
            Some(domain) => Err(AcmeError::UnsupportedChallenge {
                domain: domain.clone(),
                challenge: ChallengeKind::Http01.to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn present(&self, challenge: &Challenge) -> AcmeResult<()> {
        let path = self.challenge_path(&challenge.token)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, challenge.key_authorization.as_bytes()).await?;
        tracing::info!("🚀 HTTP-01 response for {} written to {:?}", challenge.domain, path);
        Ok(())
    }

    async fn cleanup(&self, challenge: &Challenge) -> AcmeResult<()> {
        let path = self.challenge_path(&challenge.token)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("🧹 Removed HTTP-01 response {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
