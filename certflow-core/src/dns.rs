//! DNS provider registry
//!
//! Maps a [`DnsProviderRecord`]'s `kind` to a builder for the provider
//! implementation. `hook` is always registered.

use crate::config::DnsProviderRecord;
use crate::error::{Error, Result};
use certflow_acme::solver::DnsProvider;
use certflow_acme::HookDnsProvider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds a provider from its configuration record
pub type DnsProviderBuilder =
    Arc<dyn Fn(&DnsProviderRecord) -> Result<Arc<dyn DnsProvider>> + Send + Sync>;

/// DNS provider registry
#[derive(Clone)]
pub struct DnsProviderRegistry {
    builders: HashMap<String, DnsProviderBuilder>,
}

impl DnsProviderRegistry {
    /// Create a registry with the built-in providers
    pub fn new() -> Self {
        let mut registry = Self {
            builders: HashMap::new(),
        };
        registry.register("hook", Arc::new(build_hook));
        registry
    }

    /// Register a provider kind, replacing any previous builder
    pub fn register(&mut self, kind: &str, builder: DnsProviderBuilder) {
        tracing::debug!("Registering DNS provider kind: {}", kind);
        self.builders.insert(kind.to_string(), builder);
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.builders.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Instantiate the provider described by `record`
    pub fn build(&self, record: &DnsProviderRecord) -> Result<Arc<dyn DnsProvider>> {
        let builder = self.builders.get(&record.kind).ok_or_else(|| {
            Error::Config(format!(
                "dns provider '{}' has unknown kind '{}' (known: {})",
                record.id,
                record.kind,
                self.kinds().join(", ")
            ))
        })?;
        (**builder)(record)
    }
}

impl Default for DnsProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `program` is required, `timeout_secs` optional; every other setting is
/// passed to the hook as an environment variable.
fn build_hook(record: &DnsProviderRecord) -> Result<Arc<dyn DnsProvider>> {
    let program = record
        .settings
        .get("program")
        .ok_or_else(|| {
            Error::Config(format!("dns provider '{}' needs a 'program' setting", record.id))
        })?;

    let mut provider = HookDnsProvider::new(program);
    if let Some(timeout) = record.settings.get("timeout_secs") {
        let secs: u64 = timeout
            .parse()
            .map_err(|_| {
                Error::Config(format!("dns provider '{}' has invalid timeout_secs", record.id))
            })?;
        provider = provider.with_timeout(Duration::from_secs(secs));
    }

    let mut env: Vec<(&String, &String)> = record
        .settings
        .iter()
        .filter(|(key, _)| key.as_str() != "program" && key.as_str() != "timeout_secs")
        .collect();
    env.sort();
    for (key, value) in env {
        provider = provider.with_env(key.to_ascii_uppercase(), value.clone());
    }

    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: &str, settings: &[(&str, &str)]) -> DnsProviderRecord {
        DnsProviderRecord {
            id: "dns".to_string(),
            name: "zone".to_string(),
            kind: kind.to_string(),
            settings: settings.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_hook_is_built_in() {
        let registry = DnsProviderRegistry::new();
        let provider = registry
            .build(&record("hook", &[("program", "/bin/true"), ("api_token", "t")]))
            .unwrap();
        assert_eq!(provider.name(), "hook");
    }

    #[test]
    fn test_hook_requires_program() {
        let registry = DnsProviderRegistry::new();
        assert!(matches!(registry.build(&record("hook", &[])), Err(Error::Config(_))));
        assert!(registry
            .build(&record("hook", &[("program", "/bin/true"), ("timeout_secs", "soon")]))
            .is_err());
    }

    #[test]
    fn test_unknown_kind() {
        let registry = DnsProviderRegistry::new();
        let err = registry.build(&record("cloudflare", &[])).err().unwrap();
        assert!(err.to_string().contains("cloudflare"));
        assert!(err.to_string().contains("hook"));
    }
}
