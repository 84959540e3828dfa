//! Core types used throughout BestPrice
//!
//! Quotes as reported by providers, the per-side projection stored as the
//! best price, and currency pair helpers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Build the pair identifier used as key everywhere (`BASE/QUOTE`).
///
/// Case-sensitive: `btc/usd` and `BTC/USD` are different pairs.
pub fn pair_id(base: &str, quote: &str) -> String {
    format!("{}/{}", base, quote)
}

/// Side of the book a best price refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceSide {
    Bid,
    Ask,
}

impl PriceSide {
    pub const BOTH: [PriceSide; 2] = [PriceSide::Bid, PriceSide::Ask];
}

impl fmt::Display for PriceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSide::Bid => write!(f, "Bid"),
            PriceSide::Ask => write!(f, "Ask"),
        }
    }
}

/// A single provider's top of book for one pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub provider: String,
    pub base: String,
    pub quote: String,
    pub bid: Decimal,
    pub bid_amount: Decimal,
    pub ask: Decimal,
    pub ask_amount: Decimal,
    /// Provider supplied timestamp, not validated for ordering
    pub timestamp: i64,
}

impl Quote {
    pub fn pair_id(&self) -> String {
        pair_id(&self.base, &self.quote)
    }

    /// Ask minus bid, `None` when the difference does not fit a `Decimal`.
    /// Negative means the provider is crossed.
    pub fn spread(&self) -> Option<Decimal> {
        self.ask.checked_sub(self.bid)
    }

    /// Ask below bid
    pub fn is_crossed(&self) -> bool {
        self.ask < self.bid
    }

    pub fn price(&self, side: PriceSide) -> Decimal {
        match side {
            PriceSide::Bid => self.bid,
            PriceSide::Ask => self.ask,
        }
    }

    /// Project one side of the quote into a best price entry
    pub fn entry(&self, side: PriceSide) -> BestPriceEntry {
        let (price, amount) = match side {
            PriceSide::Bid => (self.bid, self.bid_amount),
            PriceSide::Ask => (self.ask, self.ask_amount),
        };
        BestPriceEntry {
            provider: self.provider.clone(),
            base: self.base.clone(),
            quote: self.quote.clone(),
            price,
            amount,
            timestamp: self.timestamp,
        }
    }
}

/// The winning price on one side of a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPriceEntry {
    pub provider: String,
    pub base: String,
    pub quote: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub timestamp: i64,
}

impl BestPriceEntry {
    pub fn pair_id(&self) -> String {
        pair_id(&self.base, &self.quote)
    }
}

impl fmt::Display for BestPriceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} x {}",
            self.provider,
            self.pair_id(),
            self.price,
            self.amount
        )
    }
}

/// A best price that moved. `entry == None` means the side was cleared
/// because no enabled provider contributes to it any more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    pub pair: String,
    pub side: PriceSide,
    pub entry: Option<BestPriceEntry>,
}

impl fmt::Display for PriceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry {
            Some(entry) => write!(f, "{} - {}", self.side, entry),
            None => write!(f, "{} - {} - No best price available", self.side, self.pair),
        }
    }
}

/// Base/quote currency combination, e.g. BTC/USD
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Parse from `BASE/QUOTE`
    pub fn from_str(s: &str) -> Option<Self> {
        let (base, quote) = s.split_once('/')?;
        if base.is_empty() || quote.is_empty() || quote.contains('/') {
            return None;
        }
        Some(Self::new(base, quote))
    }

    pub fn id(&self) -> String {
        pair_id(&self.base, &self.quote)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
