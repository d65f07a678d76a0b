use teloxide::{prelude::*, types::ParseMode, utils::markdown};
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::{TelegramTarget, Timeframe};
use strategy::ScanReport;

/// `CFXUSDT` -> `CFX`. Symbols without the quote suffix are kept whole.
pub fn coin_name(symbol: &str) -> &str {
    match symbol.strip_suffix("USDT") {
        Some(coin) if !coin.is_empty() => coin,
        _ => symbol,
    }
}

/// Render a scan report as a MarkdownV2 message.
///
/// ```text
/// *2h BH*:
///
/// *BUY*:
///   • CFX
///
/// *SELL*:
///   • None
/// ```
pub fn format_signals(report: &ScanReport, timeframe: Timeframe) -> String {
    let mut msg = format!("*{} BH*:\n\n", markdown::escape(timeframe.as_str()));
    push_section(&mut msg, "BUY", &report.buy);
    msg.push('\n');
    push_section(&mut msg, "SELL", &report.sell);
    msg
}

fn push_section(msg: &mut String, title: &str, symbols: &[String]) {
    msg.push_str(&format!("*{title}*:\n"));
    if symbols.is_empty() {
        msg.push_str("  • None\n");
    }
    for symbol in symbols {
        msg.push_str(&format!("  • {}\n", markdown::escape(coin_name(symbol))));
    }
}

/// Delivers scan results to every configured bot/chat pair.
pub struct TelegramNotifier {
    targets: Vec<(Bot, ChatId)>,
    timeframe: Timeframe,
}

impl TelegramNotifier {
    pub fn new(targets: &[TelegramTarget], timeframe: Timeframe) -> Self {
        let targets = targets
            .iter()
            .map(|t| (Bot::new(&t.token), ChatId(t.chat_id)))
            .collect();
        Self { targets, timeframe }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Send one message to every target. Returns how many deliveries
    /// succeeded; failures are logged.
    pub async fn send(&self, text: &str) -> usize {
        let mut delivered = 0;
        for (bot, chat_id) in &self.targets {
            match bot
                .send_message(*chat_id, text)
                .parse_mode(ParseMode::MarkdownV2)
                .await
            {
                Ok(_) => delivered += 1,
                Err(e) => warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram message"),
            }
        }
        delivered
    }

    pub async fn send_report(&self, report: &ScanReport) -> usize {
        let text = format_signals(report, self.timeframe);
        let delivered = self.send(&text).await;
        info!(
            delivered,
            targets = self.targets.len(),
            buy = report.buy.len(),
            sell = report.sell.len(),
            "Signal message sent"
        );
        delivered
    }

    /// Forward every report from the engine until the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<ScanReport>) {
        info!(targets = self.targets.len(), "Telegram notifier started");
        while let Some(report) = rx.recv().await {
            self.send_report(&report).await;
        }
        info!("Report channel closed, notifier stopping");
    }
}
