//! Engine error types

use thiserror::Error;

/// Why a submitted quote was dropped. Nothing is applied when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteRejection {
    #[error("Missing provider, base, or quote fields")]
    InvalidFields,

    #[error("Arbitrage detected for provider {provider} on {pair}: ask below bid")]
    ArbitrageDetected { provider: String, pair: String },
}

impl QuoteRejection {
    /// Short machine readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFields => "invalid_fields",
            Self::ArbitrageDetected { .. } => "arbitrage_detected",
        }
    }
}

/// Failure of the enablement lookup. The engine treats it as "disabled".
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Enablement registry unavailable: {0}")]
    Unavailable(String),
}

/// Failure while emitting a best price change. Logged, never rolled back.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Notifier closed: {0}")]
    Closed(String),
}
