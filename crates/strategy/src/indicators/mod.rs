pub mod bollinger;
pub mod heikin_ashi;

pub use bollinger::{BandPoint, BollingerBands};
pub use heikin_ashi::{CandleColor, HeikinAshi, HeikinAshiCandle};
