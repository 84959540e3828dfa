//! Best price change notification
//!
//! The engine hands every committed change to a `PriceNotifier` after it has
//! released its locks. Notifiers are best effort: a failure is logged by the
//! engine and never undoes the change.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::engine::NotifierError;
use crate::types::PriceChange;

pub trait PriceNotifier: Send + Sync {
    fn on_best_price_change(&self, change: &PriceChange) -> Result<(), NotifierError>;
}

/// Logs each change through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl PriceNotifier for TracingNotifier {
    fn on_best_price_change(&self, change: &PriceChange) -> Result<(), NotifierError> {
        match &change.entry {
            Some(entry) => info!(
                side = %change.side,
                pair = %change.pair,
                provider = %entry.provider,
                price = %entry.price,
                amount = %entry.amount,
                ts = entry.timestamp,
                "New best price"
            ),
            None => info!(side = %change.side, pair = %change.pair, "No best price available"),
        }
        Ok(())
    }
}

/// Forwards changes into an unbounded channel for an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<PriceChange>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PriceChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PriceNotifier for ChannelNotifier {
    fn on_best_price_change(&self, change: &PriceChange) -> Result<(), NotifierError> {
        self.tx
            .send(change.clone())
            .map_err(|e| NotifierError::Closed(e.to_string()))
    }
}

/// Calls every inner notifier, even when an earlier one fails. The first
/// error is returned.
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn PriceNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn PriceNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl PriceNotifier for FanoutNotifier {
    fn on_best_price_change(&self, change: &PriceChange) -> Result<(), NotifierError> {
        let mut first_err = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.on_best_price_change(change) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
