//! Provider enablement
//!
//! Which provider may contribute to which pair. The engine only sees the
//! `EnablementOracle` trait; `ProviderRegistry` is the persistent
//! implementation backed by a JSON file.

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::OracleError;

/// Answers "may this provider contribute to this pair right now?"
///
/// Unknown providers or pairs must answer `Ok(false)`. An `Err` is treated
/// as disabled by the engine.
pub trait EnablementOracle: Send + Sync {
    fn is_enabled(&self, provider: &str, pair: &str) -> Result<bool, OracleError>;
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty provider name")]
    EmptyProvider,
}

/// The exchanges seeded by `ProviderRegistry::randomize`, with the pairs
/// each one quotes
pub const DEFAULT_PROVIDERS: &[(&str, &[&str])] = &[
    (
        "DragonFlyExchange",
        &[
            "BTC/USD", "ETH/USD", "LTC/USD", "EUR/USD", "XRP/USD", "BTC/EUR", "ETH/EUR", "LTC/EUR",
            "EUR/GBP", "XRP/GBP",
        ],
    ),
    (
        "MoonlightExchange",
        &[
            "BTC/USD", "ETH/USD", "LTC/USD", "XRP/USD", "BCH/USD", "BTC/GBP", "ETH/GBP", "LTC/GBP",
            "EUR/GBP", "BCH/GBP",
        ],
    ),
    (
        "StellarHorizonExchange",
        &[
            "BTC/USD", "ETH/USD", "LTC/USD", "XRP/USD", "BCH/USD", "BTC/JPY", "ETH/JPY", "LTC/JPY",
            "XRP/JPY", "BCH/JPY",
        ],
    ),
    (
        "AuroraExchange",
        &[
            "BTC/USD", "ETH/USD", "XRP/USD", "EUR/USD", "BCH/USD", "BTC/JPY", "ETH/JPY", "XRP/JPY",
            "EUR/JPY", "BCH/JPY",
        ],
    ),
    (
        "GalacticExchange",
        &[
            "BTC/USD", "LTC/USD", "EUR/USD", "XRP/USD", "BCH/USD", "BTC/AUD", "LTC/AUD", "EUR/AUD",
            "XRP/AUD", "BCH/AUD",
        ],
    ),
    (
        "GoldenDragonExchange",
        &[
            "BTC/USD", "ETH/USD", "XRP/USD", "EUR/USD", "BCH/USD", "BTC/GBP", "LTC/GBP", "EUR/GBP",
            "XRP/GBP", "BCH/GBP", "BTC/AUD", "ETH/AUD",
        ],
    ),
];

/// A provider and its per-pair enabled flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(rename = "provider")]
    pub name: String,
    #[serde(default)]
    pub pairs: BTreeMap<String, bool>,
}

impl Provider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pairs: BTreeMap::new(),
        }
    }

    pub fn is_pair_enabled(&self, pair: &str) -> bool {
        self.pairs.get(pair).copied().unwrap_or(false)
    }
}

/// Persistent provider -> {pair -> enabled} map
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    /// None for a purely in-memory registry
    path: Option<PathBuf>,
    providers: RwLock<BTreeMap<String, Provider>>,
}

impl ProviderRegistry {
    /// Registry that never touches disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) the registry file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let providers = if path.exists() && fs::metadata(&path)?.len() > 0 {
            let json = fs::read_to_string(&path)?;
            let list: Vec<Provider> = serde_json::from_str(&json)?;
            list.into_iter().map(|p| (p.name.clone(), p)).collect()
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), providers = providers.len(), "Provider registry opened");

        Ok(Self {
            path: Some(path),
            providers: RwLock::new(providers),
        })
    }

    pub fn get_provider(&self, name: &str) -> Option<Provider> {
        self.providers.read().get(name).cloned()
    }

    pub fn providers(&self) -> BTreeMap<String, Provider> {
        self.providers.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    pub fn is_pair_enabled(&self, provider: &str, pair: &str) -> bool {
        self.providers
            .read()
            .get(provider)
            .map(|p| p.is_pair_enabled(pair))
            .unwrap_or(false)
    }

    /// Insert or replace a provider wholesale
    pub fn set_provider(&self, provider: Provider) -> Result<(), RegistryError> {
        if provider.name.is_empty() {
            return Err(RegistryError::EmptyProvider);
        }
        let mut providers = self.providers.write();
        providers.insert(provider.name.clone(), provider);
        self.persist(&providers)
    }

    pub fn set_pair_enabled(
        &self,
        provider: &str,
        pair: &str,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        let changes = HashMap::from([(pair.to_string(), enabled)]);
        self.set_pairs_enabled(provider, &changes)
    }

    /// Merge flags into the provider, creating it if needed. Pairs not
    /// mentioned keep their current flag.
    pub fn set_pairs_enabled(
        &self,
        provider: &str,
        pairs: &HashMap<String, bool>,
    ) -> Result<(), RegistryError> {
        if provider.is_empty() {
            return Err(RegistryError::EmptyProvider);
        }
        debug!(provider, ?pairs, "Setting pairs");

        let mut providers = self.providers.write();
        let entry = providers
            .entry(provider.to_string())
            .or_insert_with(|| Provider::new(provider));
        for (pair, enabled) in pairs {
            entry.pairs.insert(pair.clone(), *enabled);
        }
        self.persist(&providers)
    }

    /// Reseed every default provider, enabling each pair with probability 2/3
    pub fn randomize<R: Rng>(&self, rng: &mut R) -> Result<BTreeMap<String, Provider>, RegistryError> {
        let mut providers = self.providers.write();
        for (name, pairs) in DEFAULT_PROVIDERS {
            let mut provider = Provider::new(*name);
            for pair in pairs.iter() {
                provider.pairs.insert(pair.to_string(), rng.gen_range(0..3) > 0);
            }
            info!(provider = %name, pairs = ?provider.pairs, "Randomized provider");
            providers.insert(name.to_string(), provider);
        }
        self.persist(&providers)?;
        Ok(providers.clone())
    }

    /// Every pair any provider is configured for
    pub fn known_pairs(&self) -> HashSet<String> {
        self.providers
            .read()
            .values()
            .flat_map(|p| p.pairs.keys().cloned())
            .collect()
    }

    fn persist(&self, providers: &BTreeMap<String, Provider>) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let list: Vec<&Provider> = providers.values().collect();
        let json = serde_json::to_string_pretty(&list)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl EnablementOracle for ProviderRegistry {
    fn is_enabled(&self, provider: &str, pair: &str) -> Result<bool, OracleError> {
        Ok(self.is_pair_enabled(provider, pair))
    }
}

/// Fixed in-memory enablement, handy for embedding and tests
#[derive(Debug, Default)]
pub struct StaticOracle {
    enabled: RwLock<HashSet<(String, String)>>,
    allow_all: bool,
}

impl StaticOracle {
    /// Nothing enabled until `enable` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Every provider enabled for every pair
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            ..Self::default()
        }
    }

    pub fn enable(&self, provider: &str, pair: &str) {
        self.enabled
            .write()
            .insert((provider.to_string(), pair.to_string()));
    }

    pub fn disable(&self, provider: &str, pair: &str) {
        self.enabled
            .write()
            .remove(&(provider.to_string(), pair.to_string()));
    }
}

impl EnablementOracle for StaticOracle {
    fn is_enabled(&self, provider: &str, pair: &str) -> Result<bool, OracleError> {
        if self.allow_all {
            return Ok(true);
        }
        Ok(self
            .enabled
            .read()
            .contains(&(provider.to_string(), pair.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn temp_registry_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("bestprice-{}-{}", name, std::process::id()))
            .join("providers.json")
    }

    #[test]
    fn test_unknown_provider_and_pair_are_disabled() {
        let registry = ProviderRegistry::in_memory();
        assert!(!registry.is_enabled("nobody", "BTC/USD").unwrap());

        registry.set_pair_enabled("A", "BTC/USD", true).unwrap();
        assert!(registry.is_enabled("A", "BTC/USD").unwrap());
        assert!(!registry.is_enabled("A", "ETH/USD").unwrap());
    }

    #[test]
    fn test_set_pairs_merges_flags() {
        let registry = ProviderRegistry::in_memory();
        registry
            .set_pairs_enabled(
                "A",
                &HashMap::from([("BTC/USD".to_string(), true), ("ETH/USD".to_string(), true)]),
            )
            .unwrap();
        registry.set_pair_enabled("A", "ETH/USD", false).unwrap();

        let provider = registry.get_provider("A").unwrap();
        assert_eq!(provider.pairs.len(), 2);
        assert!(provider.is_pair_enabled("BTC/USD"));
        assert!(!provider.is_pair_enabled("ETH/USD"));
    }

    #[test]
    fn test_empty_provider_name_rejected() {
        let registry = ProviderRegistry::in_memory();
        assert!(matches!(
            registry.set_pair_enabled("", "BTC/USD", true),
            Err(RegistryError::EmptyProvider)
        ));
    }

    #[test]
    fn test_registry_survives_reopen() {
        let path = temp_registry_path("reopen");
        let _ = fs::remove_file(&path);

        {
            let registry = ProviderRegistry::open(&path).unwrap();
            registry.set_pair_enabled("Aurora", "BTC/JPY", true).unwrap();
            registry.set_pair_enabled("Aurora", "ETH/JPY", false).unwrap();
        }

        let reopened = ProviderRegistry::open(&path).unwrap();
        assert!(reopened.is_pair_enabled("Aurora", "BTC/JPY"));
        assert!(!reopened.is_pair_enabled("Aurora", "ETH/JPY"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_randomize_seeds_default_providers() {
        let registry = ProviderRegistry::in_memory();
        let mut rng = StdRng::seed_from_u64(7);
        let providers = registry.randomize(&mut rng).unwrap();

        assert_eq!(providers.len(), DEFAULT_PROVIDERS.len());
        let golden = &providers["GoldenDragonExchange"];
        assert_eq!(golden.pairs.len(), 12);
        assert!(registry.known_pairs().contains("BCH/JPY"));
    }

    #[test]
    fn test_static_oracle() {
        let oracle = StaticOracle::new();
        assert!(!oracle.is_enabled("A", "BTC/USD").unwrap());
        oracle.enable("A", "BTC/USD");
        assert!(oracle.is_enabled("A", "BTC/USD").unwrap());
        oracle.disable("A", "BTC/USD");
        assert!(!oracle.is_enabled("A", "BTC/USD").unwrap());

        assert!(StaticOracle::allow_all().is_enabled("x", "y").unwrap());
    }
}
