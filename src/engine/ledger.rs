//! Provider ledger
//!
//! Last quote seen per (provider, pair), kept regardless of enablement so a
//! re-enabled provider contributes again without waiting for a new quote.
//! Entries carry the engine's admission sequence number so a quote applied
//! late never replaces one admitted after it.

use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};

use crate::types::Quote;

#[derive(Debug, Clone, PartialEq, Eq)]
struct LedgerEntry {
    seq: u64,
    quote: Quote,
}

#[derive(Debug, Default)]
pub struct ProviderLedger {
    quotes: DashMap<String, HashMap<String, LedgerEntry>>,
}

impl ProviderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the quote as the provider's latest for its pair unless an entry
    /// with a higher sequence number is already there. Returns whether the
    /// quote was stored.
    pub fn record(&self, seq: u64, quote: Quote) -> bool {
        let pair = quote.pair_id();
        let mut pairs = self.quotes.entry(quote.provider.clone()).or_default();
        match pairs.get_mut(&pair) {
            Some(existing) if existing.seq > seq => false,
            Some(existing) => {
                *existing = LedgerEntry { seq, quote };
                true
            }
            None => {
                pairs.insert(pair, LedgerEntry { seq, quote });
                true
            }
        }
    }

    pub fn latest(&self, provider: &str, pair: &str) -> Option<Quote> {
        self.quotes
            .get(provider)?
            .get(pair)
            .map(|entry| entry.quote.clone())
    }

    /// Providers that ever reported, sorted
    pub fn providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = self.quotes.iter().map(|e| e.key().clone()).collect();
        providers.sort();
        providers
    }

    /// Pairs a provider ever reported, sorted
    pub fn pairs_for(&self, provider: &str) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .quotes
            .get(provider)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        pairs.sort();
        pairs
    }

    /// Consistent-per-provider copy of the whole ledger, ordered by provider
    /// then pair so a sweep over it is deterministic
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Quote>> {
        self.quotes
            .iter()
            .map(|entry| {
                let pairs = entry
                    .value()
                    .iter()
                    .map(|(pair, entry)| (pair.clone(), entry.quote.clone()))
                    .collect();
                (entry.key().clone(), pairs)
            })
            .collect()
    }

    /// Number of (provider, pair) entries
    pub fn len(&self) -> usize {
        self.quotes.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything. Test harnesses only.
    pub fn clear(&self) {
        self.quotes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(provider: &str, base: &str, bid: rust_decimal::Decimal) -> Quote {
        Quote {
            provider: provider.to_string(),
            base: base.to_string(),
            quote: "USD".to_string(),
            bid,
            bid_amount: dec!(1),
            ask: bid + dec!(1),
            ask_amount: dec!(1),
            timestamp: 0,
        }
    }

    #[test]
    fn test_record_overwrites_per_provider_and_pair() {
        let ledger = ProviderLedger::new();
        assert!(ledger.record(1, quote("A", "BTC", dec!(100))));
        ledger.record(2, quote("A", "ETH", dec!(10)));
        assert!(ledger.record(3, quote("A", "BTC", dec!(90))));

        assert_eq!(ledger.latest("A", "BTC/USD").unwrap().bid, dec!(90));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.pairs_for("A"), vec!["BTC/USD", "ETH/USD"]);
    }

    #[test]
    fn test_late_older_quote_does_not_replace_newer() {
        let ledger = ProviderLedger::new();
        assert!(ledger.record(7, quote("A", "BTC", dec!(95))));
        assert!(!ledger.record(6, quote("A", "BTC", dec!(120))));

        assert_eq!(ledger.latest("A", "BTC/USD").unwrap().bid, dec!(95));
        assert_eq!(ledger.snapshot()["A"]["BTC/USD"].bid, dec!(95));
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let ledger = ProviderLedger::new();
        ledger.record(1, quote("Moonlight", "BTC", dec!(1)));
        ledger.record(2, quote("Aurora", "BTC", dec!(2)));
        ledger.record(3, quote("Galactic", "BTC", dec!(3)));

        let providers: Vec<_> = ledger.snapshot().into_keys().collect();
        assert_eq!(providers, vec!["Aurora", "Galactic", "Moonlight"]);
        assert_eq!(ledger.providers(), providers);
    }

    #[test]
    fn test_unknown_lookups_are_empty() {
        let ledger = ProviderLedger::new();
        assert!(ledger.latest("nobody", "BTC/USD").is_none());
        assert!(ledger.pairs_for("nobody").is_empty());
        assert!(ledger.is_empty());
    }
}
