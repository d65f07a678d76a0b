pub mod binance;
pub mod lifecycle;
pub mod pairs;
pub mod schedule;

pub use binance::BinanceClient;
pub use lifecycle::Engine;
pub use pairs::{load_pairs, load_pairs_from_reader, normalize_symbol};
pub use schedule::Schedule;
