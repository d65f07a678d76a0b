use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The input sequence is shorter than the computation needs.
    #[error("Insufficient data: need at least {required} candles, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// A candle breaks the OHLC ordering invariant or carries a non-finite price.
    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: String },

    #[error("Series length mismatch: {heikin_ashi} Heikin-Ashi candles vs {bands} band points")]
    SeriesMismatch { heikin_ashi: usize, bands: usize },

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
