//! Market simulator
//!
//! Usage: cargo run --bin market-simulator [-- path/to/simulator.yaml]
//!
//! Without an argument the simulator settings come from the application
//! config, and the provider list from the provider registry.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use bestprice::config::{self, AppConfig};
use bestprice::simulator::{self, SimulatorConfig};
use bestprice::ProviderRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let app = AppConfig::load()?;
    config::init_logging(&app.logging);

    let sim = match std::env::args().nth(1) {
        Some(path) => SimulatorConfig::load(&path)?,
        None => {
            let mut sim = app.simulator.clone();
            if sim.providers.is_empty() {
                let registry = ProviderRegistry::open(&app.registry.path)
                    .context("Failed to open provider registry")?;
                if registry.is_empty() {
                    registry.randomize(&mut rand::thread_rng())?;
                }
                sim = sim.with_registry_providers(&registry);
            }
            sim
        }
    };

    info!(api = %sim.api_url, providers = sim.providers.len(), "📈 Market simulator starting");

    tokio::select! {
        result = simulator::run(sim, StdRng::from_entropy()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
