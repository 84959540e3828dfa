//! Market simulator
//!
//! Random-walk quote generator that feeds the price API, one quote per
//! configured (provider, pair) per round.

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::providers::ProviderRegistry;
use crate::types::{CurrencyPair, Quote};

const MIN_PRICE: Decimal = dec!(0.01);
const TICK: Decimal = dec!(0.01);

/// Simulator settings, stored as YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Base URL of the price API
    pub api_url: String,
    /// Lower bound of the pause between rounds, in seconds
    pub min_sleep: u64,
    /// Upper bound of the pause between rounds, in seconds
    pub max_sleep: u64,
    pub initial_price: f64,
    pub initial_quantity: f64,
    /// Largest price move per round
    pub price_change_factor: f64,
    /// Largest amount move per round
    pub quantity_change_factor: f64,
    /// Allow quotes whose bid exceeds the previous ask (rejected by the API)
    pub allow_arbitrage: bool,
    /// Provider -> pairs it quotes (`BASE/QUOTE`)
    pub providers: BTreeMap<String, Vec<String>>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            min_sleep: 1,
            max_sleep: 5,
            initial_price: 100.0,
            initial_quantity: 1000.0,
            price_change_factor: 10.0,
            quantity_change_factor: 100.0,
            allow_arbitrage: false,
            providers: BTreeMap::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read simulator config {}", path.display()))?;
        serde_yaml::from_str(&yaml).context("Failed to parse simulator config")
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let yaml = serde_yaml::to_string(self).context("Failed to encode simulator config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write simulator config {}", path.display()))
    }

    /// Quote every pair known to the registry, enabled or not
    pub fn with_registry_providers(mut self, registry: &ProviderRegistry) -> Self {
        self.providers = registry
            .providers()
            .into_iter()
            .map(|(name, provider)| (name, provider.pairs.into_keys().collect()))
            .collect();
        self
    }

    /// Configured (provider, pair) combinations, skipping malformed pairs
    pub fn targets(&self) -> Vec<(String, CurrencyPair)> {
        let mut targets = Vec::new();
        for (provider, pairs) in &self.providers {
            for raw in pairs {
                match CurrencyPair::from_str(raw) {
                    Some(pair) => targets.push((provider.clone(), pair)),
                    None => warn!(provider = %provider, pair = %raw, "Skipping malformed pair"),
                }
            }
        }
        targets
    }
}

/// Last generated state of one (provider, pair)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceHistory {
    pub bid: Decimal,
    pub ask: Decimal,
    pub bid_amount: Decimal,
    pub ask_amount: Decimal,
}

/// Random-walk quote generator
#[derive(Debug)]
pub struct QuoteGenerator<R: Rng> {
    config: SimulatorConfig,
    rng: R,
    history: HashMap<(String, String), PriceHistory>,
}

impl<R: Rng> QuoteGenerator<R> {
    pub fn new(config: SimulatorConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            history: HashMap::new(),
        }
    }

    pub fn history(&self, provider: &str, pair: &CurrencyPair) -> Option<PriceHistory> {
        self.history.get(&(provider.to_string(), pair.id())).copied()
    }

    /// Advance the walk for one (provider, pair) and build the quote
    pub fn next_quote(&mut self, provider: &str, pair: &CurrencyPair, timestamp: i64) -> Quote {
        let initial_price = to_cents(self.config.initial_price);
        let initial_quantity = to_cents(self.config.initial_quantity);
        let last = self
            .history
            .get(&(provider.to_string(), pair.id()))
            .copied()
            .unwrap_or(PriceHistory {
                bid: initial_price,
                ask: initial_price,
                bid_amount: initial_quantity,
                ask_amount: initial_quantity,
            });

        let price_factor = self.config.price_change_factor;
        let quantity_factor = self.config.quantity_change_factor;

        let mut ask = self.walk_price(last.ask, price_factor);
        let mut bid = self.walk_price(last.bid, price_factor);
        if !self.config.allow_arbitrage {
            ask = ask.max(last.bid + TICK);
            bid = bid.min(last.ask - TICK).min(ask - TICK).max(MIN_PRICE);
        }

        let next = PriceHistory {
            bid,
            ask,
            bid_amount: self.walk_amount(last.bid_amount, quantity_factor),
            ask_amount: self.walk_amount(last.ask_amount, quantity_factor),
        };
        self.history
            .insert((provider.to_string(), pair.id()), next);

        Quote {
            provider: provider.to_string(),
            base: pair.base.clone(),
            quote: pair.quote.clone(),
            bid: next.bid,
            bid_amount: next.bid_amount,
            ask: next.ask,
            ask_amount: next.ask_amount,
            timestamp,
        }
    }

    fn step(&mut self, factor: f64) -> f64 {
        (self.rng.gen::<f64>() * 2.0 - 1.0) * factor
    }

    fn walk_price(&mut self, last: Decimal, factor: f64) -> Decimal {
        let next = to_cents_from(last, self.step(factor));
        if next < MIN_PRICE {
            // bounce back into (0.01, factor]
            let bounce = self.rng.gen::<f64>() * (factor - 0.01).max(0.0) + 0.01;
            return (MIN_PRICE + to_cents(bounce)).max(MIN_PRICE);
        }
        next
    }

    fn walk_amount(&mut self, last: Decimal, factor: f64) -> Decimal {
        let next = to_cents_from(last, self.step(factor));
        if next < Decimal::ZERO {
            let bounce = self.rng.gen::<f64>() * factor + 0.01;
            return MIN_PRICE + to_cents(bounce);
        }
        next
    }
}

fn to_cents(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO).round_dp(2)
}

fn to_cents_from(last: Decimal, delta: f64) -> Decimal {
    (last + Decimal::from_f64(delta).unwrap_or(Decimal::ZERO)).round_dp(2)
}

/// Posts generated quotes to the price API
#[derive(Debug, Clone)]
pub struct SimulatorClient {
    client: Client,
    api_url: String,
}

impl SimulatorClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// POST one quote. Non-2xx answers are returned as errors with the body.
    pub async fn send(&self, quote: &Quote) -> Result<()> {
        let url = format!("{}/prices", self.api_url);
        let response = self
            .client
            .post(&url)
            .json(quote)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Unexpected status {}: {}", status, body);
        }
        Ok(())
    }
}

/// Sends one quote per target per round until the task is cancelled
pub async fn run<R: Rng>(config: SimulatorConfig, rng: R) -> Result<()> {
    let client = SimulatorClient::new(&config.api_url)?;
    let targets = config.targets();
    if targets.is_empty() {
        anyhow::bail!("No providers configured for the simulator");
    }
    let (min_sleep, max_sleep) = (config.min_sleep, config.max_sleep.max(config.min_sleep));
    let mut generator = QuoteGenerator::new(config, rng);

    info!(targets = targets.len(), "Market simulator started");

    loop {
        run_round(&client, &mut generator, &targets).await;

        let secs = generator.rng.gen_range(min_sleep..=max_sleep);
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

/// One pass over every target. Send failures are logged and skipped.
pub async fn run_round<R: Rng>(
    client: &SimulatorClient,
    generator: &mut QuoteGenerator<R>,
    targets: &[(String, CurrencyPair)],
) -> usize {
    let mut sent = 0;
    for (provider, pair) in targets {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let quote = generator.next_quote(provider, pair, timestamp);
        info!(
            provider = %provider,
            pair = %pair,
            bid = %quote.bid,
            bid_amount = %quote.bid_amount,
            ask = %quote.ask,
            ask_amount = %quote.ask_amount,
            "Sending quote"
        );
        match client.send(&quote).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(provider = %provider, pair = %pair, error = %e, "Failed to send quote"),
        }
    }
    sent
}
