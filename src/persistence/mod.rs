//! CSV Persistence Module
//!
//! Append-only audit log of best price changes, one file per day.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::engine::NotifierError;
use crate::notifier::PriceNotifier;
use crate::types::PriceChange;

/// One best price change as stored on disk. Cleared sides have no provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPriceRecord {
    pub recorded_at: i64,
    pub side: String,
    pub pair: String,
    pub provider: Option<String>,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub quote_ts: Option<i64>,
}

impl From<&PriceChange> for BestPriceRecord {
    fn from(change: &PriceChange) -> Self {
        let entry = change.entry.as_ref();
        Self {
            recorded_at: Utc::now().timestamp_millis(),
            side: change.side.to_string(),
            pair: change.pair.clone(),
            provider: entry.map(|e| e.provider.clone()),
            price: entry.map(|e| e.price),
            amount: entry.map(|e| e.amount),
            quote_ts: entry.map(|e| e.timestamp),
        }
    }
}

struct DailyWriter {
    day: NaiveDate,
    writer: csv::Writer<std::fs::File>,
}

/// CSV audit log of best price changes
pub struct AuditLog {
    data_dir: PathBuf,
    writer: Mutex<DailyWriter>,
}

impl AuditLog {
    /// Create the audit directory and open today's file
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().join("best_prices");
        fs::create_dir_all(&data_dir).context("Failed to create audit directory")?;

        let day = Utc::now().date_naive();
        let writer = Self::create_writer(&data_dir, day)?;

        Ok(Self {
            data_dir,
            writer: Mutex::new(DailyWriter { day, writer }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.data_dir
    }

    fn file_for(dir: &Path, day: NaiveDate) -> PathBuf {
        dir.join(format!("best_prices_{}.csv", day.format("%Y-%m-%d")))
    }

    fn create_writer(dir: &Path, day: NaiveDate) -> Result<csv::Writer<std::fs::File>> {
        let path = Self::file_for(dir, day);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(writer)
    }

    /// Append one record, rolling over to a new file at midnight UTC
    pub fn append(&self, record: &BestPriceRecord) -> Result<(), NotifierError> {
        let mut current = self.writer.lock();

        let today = Utc::now().date_naive();
        if today != current.day {
            let writer = Self::create_writer(&self.data_dir, today)
                .map_err(|e| NotifierError::Io(std::io::Error::other(e.to_string())))?;
            *current = DailyWriter { day: today, writer };
        }

        current.writer.serialize(record)?;
        current.writer.flush()?;
        Ok(())
    }

    /// Load every record written on `day`
    pub fn load_day(&self, day: NaiveDate) -> Result<Vec<BestPriceRecord>> {
        let path = Self::file_for(&self.data_dir, day);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .context("Failed to open audit file")?;

        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row.context("Failed to parse audit record")?);
        }
        Ok(records)
    }
}

impl PriceNotifier for AuditLog {
    fn on_best_price_change(&self, change: &PriceChange) -> Result<(), NotifierError> {
        self.append(&BestPriceRecord::from(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BestPriceEntry, PriceSide};
    use rust_decimal_macros::dec;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bestprice-audit-{}-{}-{}",
            name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_audit_log_appends_changes_and_clears() {
        let dir = temp_dir("append");
        let log = AuditLog::new(&dir).unwrap();

        let set = PriceChange {
            pair: "ETH/EUR".to_string(),
            side: PriceSide::Ask,
            entry: Some(BestPriceEntry {
                provider: "Aurora".to_string(),
                base: "ETH".to_string(),
                quote: "EUR".to_string(),
                price: dec!(101.25),
                amount: dec!(3.5),
                timestamp: 42,
            }),
        };
        let cleared = PriceChange {
            pair: "ETH/EUR".to_string(),
            side: PriceSide::Bid,
            entry: None,
        };

        log.on_best_price_change(&set).unwrap();
        log.on_best_price_change(&cleared).unwrap();

        let records = log.load_day(Utc::now().date_naive()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].side, "Ask");
        assert_eq!(records[0].provider.as_deref(), Some("Aurora"));
        assert_eq!(records[0].price, Some(dec!(101.25)));
        assert_eq!(records[0].quote_ts, Some(42));
        assert_eq!(records[1].provider, None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reopen_does_not_repeat_header() {
        let dir = temp_dir("reopen");
        let change = PriceChange {
            pair: "BTC/USD".to_string(),
            side: PriceSide::Bid,
            entry: None,
        };

        AuditLog::new(&dir).unwrap().on_best_price_change(&change).unwrap();
        let log = AuditLog::new(&dir).unwrap();
        log.on_best_price_change(&change).unwrap();

        let records = log.load_day(Utc::now().date_naive()).unwrap();
        assert_eq!(records.len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }
}
