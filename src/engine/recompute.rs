//! Full recomputation sweep
//!
//! Rebuilds the best price of every pair from the provider ledger under the
//! current enablement rules. Used after a provider is enabled or disabled,
//! since the fast path can only ever raise a price.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, info};

use super::store::PairCandidates;
use super::BestPriceEngine;
use crate::types::PriceChange;

/// What a sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeSummary {
    /// Enabled (provider, pair) quotes considered
    pub candidates: usize,
    /// (provider, pair) quotes skipped because the provider is disabled
    pub suppressed: usize,
    /// Pairs visited (populated before the sweep or with at least one candidate)
    pub pairs: usize,
    pub changes: Vec<PriceChange>,
}

impl BestPriceEngine {
    /// Rebuild every pair from the ledger and commit the result.
    ///
    /// Sweeps are serialized with each other but run concurrently with
    /// ingestion. Pairs that a fast-path update touched while the sweep was
    /// running only take strictly better prices; all other pairs take the
    /// recomputed values, which may lower or clear a side.
    pub fn recompute(&self) -> RecomputeSummary {
        let _sweep = self.sweep_lock.lock();
        let started = Instant::now();

        // revisions first, ledger second: a quote recorded in between is
        // either in the snapshot or shows up as a revision bump
        let revisions = self.store.revisions();
        let ledger = self.ledger.snapshot();

        let mut summary = RecomputeSummary::default();
        let mut best: BTreeMap<String, PairCandidates> = BTreeMap::new();

        for (provider, pairs) in &ledger {
            for (pair, quote) in pairs {
                if self.is_enabled(provider, pair) {
                    best.entry(pair.clone()).or_default().offer(quote);
                    summary.candidates += 1;
                } else {
                    summary.suppressed += 1;
                }
            }
        }

        let pairs: BTreeSet<&String> = best.keys().chain(revisions.keys()).collect();
        summary.pairs = pairs.len();

        let empty = PairCandidates::default();
        for pair in pairs {
            let candidates = best.get(pair).unwrap_or(&empty);
            let seen = revisions.get(pair).copied();
            let changes = self.store.commit(pair, candidates, seen);
            if !changes.is_empty() {
                debug!(pair = %pair, changes = changes.len(), "Recompute replaced best price");
                self.emit(&changes);
            }
            summary.changes.extend(changes);
        }

        self.stats.record_recompute();
        info!(
            pairs = summary.pairs,
            candidates = summary.candidates,
            suppressed = summary.suppressed,
            changes = summary.changes.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Recomputed best prices"
        );

        summary
    }
}
