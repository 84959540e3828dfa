//! BestPrice server
//!
//! Wires the provider registry, notifiers and engine together and serves the
//! price API.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use bestprice::api::{self, ApiState};
use bestprice::config::{self, AppConfig};
use bestprice::notifier::{FanoutNotifier, PriceNotifier, TracingNotifier};
use bestprice::persistence::AuditLog;
use bestprice::{BestPriceEngine, ProviderRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    config::init_logging(&config.logging);

    info!("🚀 Starting BestPrice");
    info!("Config: {}", config);

    let registry = Arc::new(
        ProviderRegistry::open(&config.registry.path).context("Failed to open provider registry")?,
    );
    if config.registry.randomize_on_start
        || (config.registry.randomize_when_empty && registry.is_empty())
    {
        let providers = registry.randomize(&mut rand::thread_rng())?;
        info!(providers = providers.len(), "Seeded provider registry");
    }

    let mut notifier = FanoutNotifier::new().with(Arc::new(TracingNotifier));
    if config.audit.enabled {
        let audit = AuditLog::new(&config.audit.data_dir)?;
        info!(dir = %audit.dir().display(), "Audit log enabled");
        notifier = notifier.with(Arc::new(audit));
    } else {
        warn!("Audit log disabled");
    }
    let notifier: Arc<dyn PriceNotifier> = Arc::new(notifier);

    let engine = Arc::new(BestPriceEngine::new(registry.clone(), notifier));

    let state = ApiState {
        engine: engine.clone(),
        registry,
    };
    api::start_server(state, &config.server.listen_addr).await?;

    let stats = engine.stats();
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        best_changes = stats.best_changes,
        "👋 BestPrice stopped"
    );
    Ok(())
}
