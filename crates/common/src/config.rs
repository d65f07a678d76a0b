use crate::{Error, Result};

const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";

/// One Telegram delivery target: a bot token plus the chat it posts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramTarget {
    pub token: String,
    pub chat_id: i64,
}

/// All configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram: TELEGRAM_BOT_TOKEN_1 / TELEGRAM_CHAT_ID_1, _2, ...
    pub telegram_targets: Vec<TelegramTarget>,

    // Market data
    pub binance_base_url: String,
    pub pairs_file: String,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        // a missing .env is fine, the variables may come from the process
        if dotenvy::dotenv().is_err() {
            tracing::debug!("No .env file loaded");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            telegram_targets: telegram_targets(&lookup)?,
            binance_base_url: lookup("BINANCE_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BINANCE_URL.to_string()),
            pairs_file: lookup("PAIRS_FILE").unwrap_or_else(|| "trading_pairs.csv".to_string()),
            strategy_config_path: lookup("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
        })
    }
}

/// Collect numbered bot/chat pairs until the first missing token.
fn telegram_targets<F>(lookup: &F) -> Result<Vec<TelegramTarget>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut targets = Vec::new();
    for n in 1.. {
        let Some(token) = lookup(&format!("TELEGRAM_BOT_TOKEN_{n}")) else {
            break;
        };
        let chat_key = format!("TELEGRAM_CHAT_ID_{n}");
        let raw_chat = lookup(&chat_key).ok_or_else(|| {
            Error::Config(format!("'{chat_key}' must be set alongside TELEGRAM_BOT_TOKEN_{n}"))
        })?;
        let chat_id = raw_chat.trim().parse::<i64>().map_err(|_| {
            Error::Config(format!("'{chat_key}' is not a numeric chat id: '{}'", raw_chat.trim()))
        })?;
        targets.push(TelegramTarget {
            token: token.trim().to_string(),
            chat_id,
        });
    }
    Ok(targets)
}
