//! BestPrice Library
//!
//! Best bid/ask aggregation across streaming market-data providers

pub mod config;
pub mod engine;
pub mod notifier;
pub mod persistence;
pub mod providers;
pub mod simulator;
pub mod types;

#[cfg(feature = "api")]
pub mod api;

pub use engine::{BestPriceEngine, EngineStats, PendingUpdate, QuoteRejection, UpdateOutcome};
pub use notifier::PriceNotifier;
pub use providers::{EnablementOracle, ProviderRegistry};
pub use types::{BestPriceEntry, CurrencyPair, PriceChange, PriceSide, Quote};
