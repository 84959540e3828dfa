//! Best-price engine
//!
//! Accepts provider quotes, keeps the provider ledger current and maintains
//! the best bid/ask per pair:
//! - validation and rejection of malformed or crossed quotes
//! - fast-path strict-greater update of the best-price store
//! - full recomputation sweep after enablement changes
//! - change notification outside of any store lock

mod error;
mod ledger;
mod recompute;
mod store;

pub use error::{NotifierError, OracleError, QuoteRejection};
pub use ledger::ProviderLedger;
pub use recompute::RecomputeSummary;
pub use store::{BestPriceStore, CommitMode, PairBook, PairCandidates, SideCandidates};

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::notifier::PriceNotifier;
use crate::providers::EnablementOracle;
use crate::types::{BestPriceEntry, PriceChange, PriceSide, Quote};

/// Result of applying one accepted quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub pair: String,
    /// False when the provider is disabled for the pair (ledger only)
    pub counted: bool,
    pub changes: Vec<PriceChange>,
}

/// Handle to a quote accepted by `BestPriceEngine::submit` whose store
/// mutation may still be running
#[derive(Debug)]
pub struct PendingUpdate {
    handle: JoinHandle<UpdateOutcome>,
}

impl PendingUpdate {
    /// Wait until the ledger and store mutation has completed
    pub async fn completed(self) -> Result<UpdateOutcome, JoinError> {
        self.handle.await
    }
}

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub accepted: u64,
    pub rejected: u64,
    pub suppressed: u64,
    pub best_changes: u64,
    pub recomputes: u64,
    pub oracle_failures: u64,
    pub notifier_failures: u64,
}

#[derive(Debug, Default)]
struct EngineCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    suppressed: AtomicU64,
    best_changes: AtomicU64,
    recomputes: AtomicU64,
    oracle_failures: AtomicU64,
    notifier_failures: AtomicU64,
}

impl EngineCounters {
    fn record_recompute(&self) {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            best_changes: self.best_changes.load(Ordering::Relaxed),
            recomputes: self.recomputes.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            notifier_failures: self.notifier_failures.load(Ordering::Relaxed),
        }
    }
}

/// The aggregation engine. Share it behind an `Arc`.
pub struct BestPriceEngine {
    store: BestPriceStore,
    ledger: ProviderLedger,
    oracle: Arc<dyn EnablementOracle>,
    notifier: Arc<dyn PriceNotifier>,
    /// Serializes sweeps with each other, never held by the fast path
    sweep_lock: Mutex<()>,
    /// Admission order of accepted quotes
    sequence: AtomicU64,
    stats: EngineCounters,
}

impl BestPriceEngine {
    pub fn new(oracle: Arc<dyn EnablementOracle>, notifier: Arc<dyn PriceNotifier>) -> Self {
        Self {
            store: BestPriceStore::new(),
            ledger: ProviderLedger::new(),
            oracle,
            notifier,
            sweep_lock: Mutex::new(()),
            sequence: AtomicU64::new(0),
            stats: EngineCounters::default(),
        }
    }

    /// Check a quote without applying it
    pub fn validate(quote: &Quote) -> Result<(), QuoteRejection> {
        if quote.provider.trim().is_empty()
            || quote.base.trim().is_empty()
            || quote.quote.trim().is_empty()
        {
            return Err(QuoteRejection::InvalidFields);
        }
        if quote.is_crossed() {
            return Err(QuoteRejection::ArbitrageDetected {
                provider: quote.provider.clone(),
                pair: quote.pair_id(),
            });
        }
        Ok(())
    }

    /// Validate and fully apply a quote on the calling thread
    pub fn process(&self, quote: Quote) -> Result<UpdateOutcome, QuoteRejection> {
        let seq = self.admit(&quote)?;
        Ok(self.apply(seq, quote))
    }

    /// Validate a quote and apply it on a Tokio task.
    ///
    /// Returns as soon as the quote is validated. Must be called from within
    /// a Tokio runtime.
    pub fn submit(self: &Arc<Self>, quote: Quote) -> Result<PendingUpdate, QuoteRejection> {
        let seq = self.admit(&quote)?;
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.apply(seq, quote) });
        Ok(PendingUpdate { handle })
    }

    /// Run `recompute` on the blocking pool
    pub fn recompute_in_background(self: &Arc<Self>) -> JoinHandle<RecomputeSummary> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || engine.recompute())
    }

    pub fn best_bid(&self, pair: &str) -> Option<BestPriceEntry> {
        self.store.best(pair, PriceSide::Bid)
    }

    pub fn best_ask(&self, pair: &str) -> Option<BestPriceEntry> {
        self.store.best(pair, PriceSide::Ask)
    }

    pub fn book(&self, pair: &str) -> Option<PairBook> {
        self.store.book(pair)
    }

    /// Every populated pair, ordered by pair id
    pub fn snapshot(&self) -> BTreeMap<String, PairBook> {
        self.store.snapshot()
    }

    pub fn ledger(&self) -> &ProviderLedger {
        &self.ledger
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// Validate and stamp the quote with its admission sequence number
    fn admit(&self, quote: &Quote) -> Result<u64, QuoteRejection> {
        match Self::validate(quote) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
            }
            Err(rejection) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(provider = %quote.provider, pair = %quote.pair_id(), reason = %rejection, "Dropping quote");
                Err(rejection)
            }
        }
    }

    /// Ledger write, then enablement check and store compare-and-set under
    /// the pair lock, then notify
    fn apply(&self, seq: u64, quote: Quote) -> UpdateOutcome {
        let pair = quote.pair_id();
        if !self.ledger.record(seq, quote.clone()) {
            debug!(provider = %quote.provider, pair = %pair, seq, "Newer quote already in ledger");
        }

        let Some(changes) = self
            .store
            .offer_if(&quote, || self.is_enabled(&quote.provider, &pair))
        else {
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(provider = %quote.provider, pair = %pair, "Provider is disabled, not updating price");
            return UpdateOutcome {
                pair,
                counted: false,
                changes: Vec::new(),
            };
        };
        self.emit(&changes);

        UpdateOutcome {
            pair,
            counted: true,
            changes,
        }
    }

    fn is_enabled(&self, provider: &str, pair: &str) -> bool {
        match self.oracle.is_enabled(provider, pair) {
            Ok(enabled) => enabled,
            Err(e) => {
                self.stats.oracle_failures.fetch_add(1, Ordering::Relaxed);
                warn!(provider, pair, error = %e, "Enablement lookup failed, treating as disabled");
                false
            }
        }
    }

    fn emit(&self, changes: &[PriceChange]) {
        for change in changes {
            self.stats.best_changes.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.notifier.on_best_price_change(change) {
                self.stats.notifier_failures.fetch_add(1, Ordering::Relaxed);
                warn!(pair = %change.pair, side = %change.side, error = %e, "Failed to emit best price change");
            }
        }
    }

    /// Drop all ledger and store state. Test harnesses only.
    pub fn reset(&self) {
        let _sweep = self.sweep_lock.lock();
        self.store.clear();
        self.ledger.clear();
    }
}
