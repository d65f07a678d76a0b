pub mod notifier;

pub use notifier::{coin_name, format_signals, TelegramNotifier};
