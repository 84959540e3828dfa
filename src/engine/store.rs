//! Best-price store
//!
//! Holds the winning bid and ask per pair. Every read-compare-write happens
//! while holding the pair's shard lock, so updates to one pair are
//! linearizable. Callers get the resulting changes back and emit them after
//! the lock is released.

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::types::{BestPriceEntry, PriceChange, PriceSide, Quote};

/// Current best bid and ask for one pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairBook {
    pub best_bid: Option<BestPriceEntry>,
    pub best_ask: Option<BestPriceEntry>,
    /// Bumped on every mutation; lets a sweep detect concurrent fast-path writes
    #[serde(skip)]
    revision: u64,
}

impl PairBook {
    pub fn side(&self, side: PriceSide) -> Option<&BestPriceEntry> {
        match side {
            PriceSide::Bid => self.best_bid.as_ref(),
            PriceSide::Ask => self.best_ask.as_ref(),
        }
    }

    fn slot(&mut self, side: PriceSide) -> &mut Option<BestPriceEntry> {
        match side {
            PriceSide::Bid => &mut self.best_bid,
            PriceSide::Ask => &mut self.best_ask,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Same prices and winners, ignoring the revision counter
    pub fn same_prices(&self, other: &PairBook) -> bool {
        self.best_bid == other.best_bid && self.best_ask == other.best_ask
    }
}

/// All candidates sharing the highest price on one side of a pair,
/// keyed (and therefore ordered) by provider id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideCandidates {
    pub price: Decimal,
    pub entries: BTreeMap<String, BestPriceEntry>,
}

impl SideCandidates {
    pub fn new(entry: BestPriceEntry) -> Self {
        let mut entries = BTreeMap::new();
        let price = entry.price;
        entries.insert(entry.provider.clone(), entry);
        Self { price, entries }
    }

    /// Fold another candidate in: a higher price replaces the set, an
    /// equal price joins it, a lower price is ignored.
    pub fn offer(&mut self, entry: BestPriceEntry) {
        if entry.price > self.price {
            *self = Self::new(entry);
        } else if entry.price == self.price {
            self.entries.entry(entry.provider.clone()).or_insert(entry);
        }
    }

    /// Winner for a fresh install: lowest provider id
    pub fn first(&self) -> Option<&BestPriceEntry> {
        self.entries.values().next()
    }
}

/// Recomputed best candidates for one pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairCandidates {
    pub bid: Option<SideCandidates>,
    pub ask: Option<SideCandidates>,
}

impl PairCandidates {
    pub fn offer(&mut self, quote: &Quote) {
        for side in PriceSide::BOTH {
            let entry = quote.entry(side);
            let slot = self.side_mut(side);
            match slot.as_mut() {
                Some(candidates) => candidates.offer(entry),
                None => *slot = Some(SideCandidates::new(entry)),
            }
        }
    }

    pub fn side(&self, side: PriceSide) -> Option<&SideCandidates> {
        match side {
            PriceSide::Bid => self.bid.as_ref(),
            PriceSide::Ask => self.ask.as_ref(),
        }
    }

    fn side_mut(&mut self, side: PriceSide) -> &mut Option<SideCandidates> {
        match side {
            PriceSide::Bid => &mut self.bid,
            PriceSide::Ask => &mut self.ask,
        }
    }
}

/// How a recomputed result is applied to a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Nobody touched the pair since the sweep started: the result is
    /// authoritative and may lower or clear a side.
    Replace,
    /// A fast-path update raced the sweep: only strictly better prices win.
    Improve,
}

/// Concurrent map of pair id to its best bid/ask
#[derive(Debug, Default)]
pub struct BestPriceStore {
    books: DashMap<String, PairBook>,
}

impl BestPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best(&self, pair: &str, side: PriceSide) -> Option<BestPriceEntry> {
        self.books.get(pair)?.side(side).cloned()
    }

    pub fn book(&self, pair: &str) -> Option<PairBook> {
        self.books.get(pair).map(|b| b.clone())
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Copy of every pair, ordered by pair id
    pub fn snapshot(&self) -> BTreeMap<String, PairBook> {
        self.books
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Revision of every pair currently populated
    pub fn revisions(&self) -> HashMap<String, u64> {
        self.books
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().revision))
            .collect()
    }

    /// Fast path: install either side of `quote` if it is strictly better
    /// than the incumbent. Absent sides always take the first offer.
    pub fn offer(&self, quote: &Quote) -> Vec<PriceChange> {
        self.offer_if(quote, || true).unwrap_or_default()
    }

    /// `offer`, gated on `admit` which runs while the pair is locked.
    /// Returns `None` without touching the store when `admit` says no.
    pub fn offer_if(
        &self,
        quote: &Quote,
        admit: impl FnOnce() -> bool,
    ) -> Option<Vec<PriceChange>> {
        let pair = quote.pair_id();
        let mut changes = Vec::new();

        let entry = self.books.entry(pair.clone());
        if !admit() {
            return None;
        }
        let mut book = entry.or_default();
        for side in PriceSide::BOTH {
            let better = match book.side(side) {
                Some(current) => quote.price(side) > current.price,
                None => true,
            };
            if better {
                let entry = quote.entry(side);
                *book.slot(side) = Some(entry.clone());
                changes.push(PriceChange {
                    pair: pair.clone(),
                    side,
                    entry: Some(entry),
                });
            }
        }
        if !changes.is_empty() {
            book.revision += 1;
        }

        Some(changes)
    }

    /// Apply a recomputed result for one pair.
    ///
    /// `seen_revision` is the pair's revision when the sweep started (None if
    /// the pair did not exist yet). Any mismatch downgrades the commit to
    /// `CommitMode::Improve`.
    pub fn commit(
        &self,
        pair: &str,
        candidates: &PairCandidates,
        seen_revision: Option<u64>,
    ) -> Vec<PriceChange> {
        let mut changes = Vec::new();

        let mut book = match self.books.get_mut(pair) {
            Some(book) => book,
            None if candidates.bid.is_none() && candidates.ask.is_none() => return changes,
            None => self.books.entry(pair.to_string()).or_default(),
        };

        let mode = if seen_revision == Some(book.revision)
            || (seen_revision.is_none() && book.revision == 0)
        {
            CommitMode::Replace
        } else {
            CommitMode::Improve
        };

        for side in PriceSide::BOTH {
            let next = resolve(book.side(side), candidates.side(side), mode);
            if let Some(next) = next {
                *book.slot(side) = next.clone();
                changes.push(PriceChange {
                    pair: pair.to_string(),
                    side,
                    entry: next,
                });
            }
        }
        if !changes.is_empty() {
            book.revision += 1;
        }

        changes
    }

    /// Drop everything. Test harnesses only.
    pub fn clear(&self) {
        self.books.clear();
    }
}

/// Decide the new value of one side. `None` means leave it alone,
/// `Some(None)` means clear it.
fn resolve(
    current: Option<&BestPriceEntry>,
    candidates: Option<&SideCandidates>,
    mode: CommitMode,
) -> Option<Option<BestPriceEntry>> {
    match (current, candidates, mode) {
        (None, None, _) => None,
        (Some(_), None, CommitMode::Replace) => Some(None),
        (Some(_), None, CommitMode::Improve) => None,
        (None, Some(c), _) => c.first().cloned().map(Some),
        (Some(cur), Some(c), CommitMode::Replace) => {
            // the incumbent keeps a tie as long as it is still a valid
            // candidate, refreshed from its latest quote
            let winner = match c.entries.get(&cur.provider) {
                Some(latest) => latest,
                None => c.first()?,
            };
            if winner == cur {
                None
            } else {
                Some(Some(winner.clone()))
            }
        }
        (Some(cur), Some(c), CommitMode::Improve) => {
            if c.price > cur.price {
                c.first().cloned().map(Some)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(provider: &str, bid: Decimal, ask: Decimal) -> Quote {
        Quote {
            provider: provider.to_string(),
            base: "BTC".to_string(),
            quote: "USD".to_string(),
            bid,
            bid_amount: dec!(1),
            ask,
            ask_amount: dec!(1),
            timestamp: 1,
        }
    }

    #[test]
    fn test_first_offer_populates_both_sides() {
        let store = BestPriceStore::new();
        let changes = store.offer(&quote("A", dec!(100), dec!(101)));

        assert_eq!(changes.len(), 2);
        assert_eq!(store.best("BTC/USD", PriceSide::Bid).unwrap().price, dec!(100));
        assert_eq!(store.best("BTC/USD", PriceSide::Ask).unwrap().price, dec!(101));
        assert_eq!(store.book("BTC/USD").unwrap().revision(), 1);
    }

    #[test]
    fn test_offer_sides_are_independent() {
        let store = BestPriceStore::new();
        store.offer(&quote("A", dec!(100), dec!(105)));

        // better bid, worse ask
        let changes = store.offer(&quote("B", dec!(102), dec!(103)));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].side, PriceSide::Bid);
        assert_eq!(store.best("BTC/USD", PriceSide::Bid).unwrap().provider, "B");
        assert_eq!(store.best("BTC/USD", PriceSide::Ask).unwrap().provider, "A");
    }

    #[test]
    fn test_equal_price_keeps_incumbent() {
        let store = BestPriceStore::new();
        store.offer(&quote("A", dec!(100), dec!(101)));
        let changes = store.offer(&quote("B", dec!(100), dec!(101)));

        assert!(changes.is_empty());
        assert_eq!(store.best("BTC/USD", PriceSide::Bid).unwrap().provider, "A");
        assert_eq!(store.book("BTC/USD").unwrap().revision(), 1);
    }

    #[test]
    fn test_side_candidates_collects_ties() {
        let mut c = SideCandidates::new(quote("C", dec!(100), dec!(101)).entry(PriceSide::Bid));
        c.offer(quote("A", dec!(100), dec!(101)).entry(PriceSide::Bid));
        c.offer(quote("B", dec!(99), dec!(101)).entry(PriceSide::Bid));

        assert_eq!(c.price, dec!(100));
        assert_eq!(c.entries.len(), 2);
        assert_eq!(c.first().unwrap().provider, "A");

        c.offer(quote("D", dec!(120), dec!(121)).entry(PriceSide::Bid));
        assert_eq!(c.entries.len(), 1);
        assert_eq!(c.first().unwrap().provider, "D");
    }

    #[test]
    fn test_replace_commit_can_lower_and_clear() {
        let store = BestPriceStore::new();
        store.offer(&quote("A", dec!(100), dec!(110)));
        let seen = store.revisions().get("BTC/USD").copied();

        let mut candidates = PairCandidates::default();
        candidates.bid = Some(SideCandidates::new(
            quote("B", dec!(90), dec!(95)).entry(PriceSide::Bid),
        ));

        let changes = store.commit("BTC/USD", &candidates, seen);
        assert_eq!(changes.len(), 2);

        let book = store.book("BTC/USD").unwrap();
        assert_eq!(book.best_bid.unwrap().price, dec!(90));
        assert!(book.best_ask.is_none());
    }

    #[test]
    fn test_improve_commit_never_lowers() {
        let store = BestPriceStore::new();
        store.offer(&quote("A", dec!(100), dec!(110)));
        let stale = store.revisions().get("BTC/USD").copied();

        // a fast-path update lands after the sweep took its revisions
        store.offer(&quote("C", dec!(105), dec!(111)));

        let mut candidates = PairCandidates::default();
        candidates.offer(&quote("B", dec!(90), dec!(112)));

        let changes = store.commit("BTC/USD", &candidates, stale);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].side, PriceSide::Ask);

        let book = store.book("BTC/USD").unwrap();
        assert_eq!(book.best_bid.unwrap().provider, "C");
        assert_eq!(book.best_ask.unwrap().price, dec!(112));
    }

    #[test]
    fn test_replace_commit_keeps_valid_incumbent_on_tie() {
        let store = BestPriceStore::new();
        store.offer(&quote("Z", dec!(100), dec!(110)));
        let seen = store.revisions().get("BTC/USD").copied();

        let mut candidates = PairCandidates::default();
        candidates.offer(&quote("A", dec!(100), dec!(110)));
        candidates.offer(&quote("Z", dec!(100), dec!(110)));

        assert!(store.commit("BTC/USD", &candidates, seen).is_empty());
        assert_eq!(store.best("BTC/USD", PriceSide::Bid).unwrap().provider, "Z");
    }

    #[test]
    fn test_replace_commit_refreshes_incumbent_from_latest_quote() {
        let store = BestPriceStore::new();
        store.offer(&quote("A", dec!(100), dec!(110)));
        let seen = store.revisions().get("BTC/USD").copied();

        // same prices, newer amount and timestamp
        let mut latest = quote("A", dec!(100), dec!(110));
        latest.bid_amount = dec!(5);
        latest.timestamp = 2;
        let mut candidates = PairCandidates::default();
        candidates.offer(&latest);
        candidates.offer(&quote("0", dec!(100), dec!(110)));

        let changes = store.commit("BTC/USD", &candidates, seen);
        assert_eq!(changes.len(), 2);

        let bid = store.best("BTC/USD", PriceSide::Bid).unwrap();
        assert_eq!(bid.provider, "A");
        assert_eq!((bid.amount, bid.timestamp), (dec!(5), 2));
        assert_eq!(store.best("BTC/USD", PriceSide::Ask).unwrap().provider, "A");

        // nothing left to refresh
        let seen = store.revisions().get("BTC/USD").copied();
        assert!(store.commit("BTC/USD", &candidates, seen).is_empty());
    }

    #[test]
    fn test_offer_if_refused_leaves_store_untouched() {
        let store = BestPriceStore::new();
        assert!(store.offer_if(&quote("A", dec!(100), dec!(110)), || false).is_none());
        assert!(store.is_empty());

        let changes = store.offer_if(&quote("A", dec!(100), dec!(110)), || true).unwrap();
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_commit_creates_missing_pair() {
        let store = BestPriceStore::new();
        let mut candidates = PairCandidates::default();
        candidates.offer(&quote("A", dec!(100), dec!(110)));

        let changes = store.commit("BTC/USD", &candidates, None);
        assert_eq!(changes.len(), 2);
        assert_eq!(store.len(), 1);

        // nothing to install and nothing there: no entry is created
        assert!(store
            .commit("ETH/USD", &PairCandidates::default(), None)
            .is_empty());
        assert!(store.book("ETH/USD").is_none());
    }
}
