use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use common::{Error, Result};

const FALLBACK_PAIRS_FILE: &str = "pairs.csv";

/// `BTC/usdt` -> `BTCUSDT`.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().replace('/', "").to_uppercase()
}

#[derive(Deserialize)]
struct PairRow {
    symbol: String,
}

/// Load the trading pairs from a CSV file with a `symbol` header.
///
/// Falls back to `pairs.csv` in the working directory when `path` does not
/// exist.
pub fn load_pairs(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let chosen = if path.exists() {
        path
    } else if Path::new(FALLBACK_PAIRS_FILE).exists() {
        warn!(missing = %path.display(), fallback = FALLBACK_PAIRS_FILE, "Pairs file not found, using fallback");
        Path::new(FALLBACK_PAIRS_FILE)
    } else {
        return Err(Error::Config(format!(
            "pairs file {} not found (and no {FALLBACK_PAIRS_FILE})",
            path.display()
        )));
    };

    let file = std::fs::File::open(chosen)?;
    let pairs = load_pairs_from_reader(file)?;
    info!(path = %chosen.display(), count = pairs.len(), "Loaded trading pairs");
    Ok(pairs)
}

/// Parse pairs from CSV. Blank symbols are skipped, duplicates keep their
/// first position.
pub fn load_pairs_from_reader<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut pairs: Vec<String> = Vec::new();

    for (line, row) in rdr.deserialize::<PairRow>().enumerate() {
        let row = row.map_err(|e| Error::Config(format!("pairs row {}: {e}", line + 1)))?;
        let symbol = normalize_symbol(&row.symbol);
        if symbol.is_empty() || pairs.contains(&symbol) {
            continue;
        }
        pairs.push(symbol);
    }
    Ok(pairs)
}
