//! Configuration management for BestPrice
//!
//! Loads from YAML/TOML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::simulator::SimulatorConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the price API listens on
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// JSON file holding provider enablement
    pub path: String,
    /// Seed the default providers with random flags when the registry is empty
    pub randomize_when_empty: bool,
    /// Reseed on every start
    pub randomize_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Write best price changes to CSV
    pub enabled: bool,
    /// Data directory for the audit files
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable logs
    pub json: bool,
    /// Default filter when RUST_LOG is not set
    pub level: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let defaults = SimulatorConfig::default();

        let config = Config::builder()
            // Server defaults
            .set_default("server.listen_addr", "0.0.0.0:8080")?
            // Registry defaults
            .set_default("registry.path", "./data/providers.json")?
            .set_default("registry.randomize_when_empty", true)?
            .set_default("registry.randomize_on_start", false)?
            // Audit defaults
            .set_default("audit.enabled", true)?
            .set_default("audit.data_dir", "./logs")?
            // Logging defaults
            .set_default("logging.json", false)?
            .set_default("logging.level", "info")?
            // Simulator defaults
            .set_default("simulator.api_url", defaults.api_url.as_str())?
            .set_default("simulator.min_sleep", defaults.min_sleep)?
            .set_default("simulator.max_sleep", defaults.max_sleep)?
            .set_default("simulator.initial_price", defaults.initial_price)?
            .set_default("simulator.initial_quantity", defaults.initial_quantity)?
            .set_default("simulator.price_change_factor", defaults.price_change_factor)?
            .set_default(
                "simulator.quantity_change_factor",
                defaults.quantity_change_factor,
            )?
            .set_default("simulator.allow_arbitrage", defaults.allow_arbitrage)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (BESTPRICE__*)
            .add_source(
                Environment::with_prefix("BESTPRICE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            bail!("server.listen_addr is not a socket address: {}", self.server.listen_addr);
        }
        if self.simulator.min_sleep > self.simulator.max_sleep {
            bail!(
                "simulator.min_sleep ({}) must not exceed simulator.max_sleep ({})",
                self.simulator.min_sleep,
                self.simulator.max_sleep
            );
        }
        if self.registry.path.is_empty() {
            bail!("registry.path must not be empty");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "listen={} registry={} audit={}({}) simulator_api={}",
            self.server.listen_addr,
            self.registry.path,
            self.audit.enabled,
            self.audit.data_dir,
            self.simulator.api_url
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // a subscriber may already be installed (tests, embedding)
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                listen_addr: "127.0.0.1:8080".to_string(),
            },
            registry: RegistryConfig {
                path: "./data/providers.json".to_string(),
                randomize_when_empty: true,
                randomize_on_start: false,
            },
            audit: AuditConfig {
                enabled: true,
                data_dir: "./logs".to_string(),
            },
            logging: LoggingConfig {
                json: false,
                level: "info".to_string(),
            },
            simulator: SimulatorConfig::default(),
        }
    }

    #[test]
    fn test_sample_config_is_valid() {
        assert!(sample().validate().is_ok());
        assert!(sample().digest().contains("listen=127.0.0.1:8080"));
    }

    #[test]
    fn test_bad_listen_addr_rejected() {
        let mut cfg = sample();
        cfg.server.listen_addr = "localhost".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sleep_range_checked() {
        let mut cfg = sample();
        cfg.simulator.min_sleep = 10;
        cfg.simulator.max_sleep = 1;
        assert!(cfg.validate().is_err());
    }
}
