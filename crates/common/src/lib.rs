pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{Config, TelegramTarget};
pub use error::{Error, Result};
pub use exchange::CandleSource;
pub use types::*;
