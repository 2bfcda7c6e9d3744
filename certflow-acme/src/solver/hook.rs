//! DNS provider that delegates to an operator-supplied executable
//!
//! The hook is invoked as `<program> present <fqdn> <value>` and
//! `<program> cleanup <fqdn> <value>`. It must exit 0 on success and is
//! expected to be idempotent itself. Anything it prints on stdout during
//! `present` is kept as the record id.

use super::dns::{DnsProvider, DnsProviderError, DnsResult, TxtRecord};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Default limit for a single hook invocation
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HookDnsProvider {
    program: PathBuf,
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl HookDnsProvider {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_HOOK_TIMEOUT,
            env: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra environment passed to the hook (provider credentials)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    async fn run(&self, action: &str, fqdn: &str, value: &str) -> DnsResult<String> {
        let mut command = Command::new(&self.program);
        command
            .arg(action)
            .arg(fqdn)
            .arg(value)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);

        tracing::debug!("🪝 Running DNS hook {:?} {} {}", self.program, action, fqdn);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| DnsProviderError::Timeout {
                elapsed_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                DnsProviderError::Configuration(format!("cannot run {:?}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DnsProviderError::ApiRequest(format!(
                "hook {} exited with {}: {}",
                action, output.status, stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl DnsProvider for HookDnsProvider {
    fn name(&self) -> &'static str {
        "hook"
    }

    async fn find_txt_record(&self, _fqdn: &str, _value: &str) -> DnsResult<Option<TxtRecord>> {
        // The hook owns idempotency, there is nothing to query.
        Ok(None)
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str) -> DnsResult<TxtRecord> {
        let stdout = self.run("present", fqdn, value).await.map_err(|e| match e {
            DnsProviderError::ApiRequest(message) => DnsProviderError::RecordCreation {
                record_name: fqdn.to_string(),
                message,
            },
            other => other,
        })?;

        let id = if stdout.is_empty() { fqdn.to_string() } else { stdout };
        Ok(TxtRecord {
            id,
            fqdn: fqdn.to_string(),
            value: value.to_string(),
        })
    }

    async fn delete_txt_record(&self, record: &TxtRecord) -> DnsResult<()> {
        self.run("cleanup", &record.fqdn, &record.value)
            .await
            .map_err(|e| match e {
                DnsProviderError::ApiRequest(message) => DnsProviderError::RecordDeletion {
                    record_id: record.id.clone(),
                    message,
                },
                other => other,
            })?;
        Ok(())
    }
}
