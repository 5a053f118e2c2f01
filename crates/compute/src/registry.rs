//! Named compute resources and the backends that serve them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::ComputeBackend;
use crate::error::ComputeError;
use crate::pfcon::PfconClient;

/// Default when `COMPUTE_RESOURCES` is unset.
pub const DEFAULT_COMPUTE_RESOURCES: &str = "host=http://localhost:30005";

/// One configured compute resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeResourceConfig {
    pub name: String,
    pub url: String,
}

impl ComputeResourceConfig {
    /// Parse `name=url` pairs separated by commas.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (name, url) = entry
                    .split_once('=')
                    .ok_or_else(|| format!("expected name=url, got '{entry}'"))?;
                let (name, url) = (name.trim(), url.trim());
                if name.is_empty() || url.is_empty() {
                    return Err(format!("expected name=url, got '{entry}'"));
                }
                Ok(Self {
                    name: name.to_string(),
                    url: url.to_string(),
                })
            })
            .collect()
    }

    /// Read `COMPUTE_RESOURCES`.
    ///
    /// # Panics
    ///
    /// Panics if the variable is set but malformed.
    pub fn from_env() -> Vec<Self> {
        let raw = std::env::var("COMPUTE_RESOURCES")
            .unwrap_or_else(|_| DEFAULT_COMPUTE_RESOURCES.into());
        Self::parse_list(&raw).expect("COMPUTE_RESOURCES must be a list of name=url pairs")
    }
}

/// Compute backends keyed by compute resource name.
#[derive(Clone, Default)]
pub struct ComputeRegistry {
    backends: BTreeMap<String, Arc<dyn ComputeBackend>>,
}

impl ComputeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pfcon client per configured resource, sharing one HTTP pool.
    pub fn from_configs(
        configs: &[ComputeResourceConfig],
        timeout: Duration,
    ) -> Result<Self, ComputeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut registry = Self::new();
        for config in configs {
            let backend = PfconClient::with_client(client.clone(), config.url.clone(), timeout);
            registry.register(config.name.clone(), Arc::new(backend));
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn ComputeBackend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Look up the backend for a compute resource.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ComputeBackend>, ComputeError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| ComputeError::UnknownResource(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_multiple_resources() {
        let parsed =
            ComputeResourceConfig::parse_list("host=http://localhost:30005, moc = https://moc:443")
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                ComputeResourceConfig {
                    name: "host".into(),
                    url: "http://localhost:30005".into(),
                },
                ComputeResourceConfig {
                    name: "moc".into(),
                    url: "https://moc:443".into(),
                },
            ]
        );
    }

    #[test]
    fn rejects_entries_without_url() {
        assert!(ComputeResourceConfig::parse_list("host").is_err());
        assert!(ComputeResourceConfig::parse_list("host=").is_err());
    }

    #[test]
    fn registry_reports_unknown_resource() {
        let configs = ComputeResourceConfig::parse_list(DEFAULT_COMPUTE_RESOURCES).unwrap();
        let registry = ComputeRegistry::from_configs(&configs, Duration::from_secs(5)).unwrap();
        assert!(registry.contains("host"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["host"]);
        assert_matches!(
            registry.get("moc").err(),
            Some(ComputeError::UnknownResource(name)) if name == "moc"
        );
    }
}
