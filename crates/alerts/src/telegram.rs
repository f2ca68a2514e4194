//! Telegram bot handlers.

use crate::db::{Database, StoreError};
use crate::dispatcher::{AlertSink, DeliveryError};
use async_trait::async_trait;
use gasalert_core::{PriceSnapshot, SnapshotReader};
use std::collections::HashSet;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup};
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const NOT_READY: &str = "Gas prices are not available yet, please try again in a few seconds.";
const THRESHOLD_PROMPT: &str = "Please enter a value in 'int' format";
const THRESHOLD_INVALID: &str = "Error. Enter value in 'int'";
const SAVE_FAILED: &str = "Could not save your alert, please try again later.";

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
}

/// Bot commands.
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show current gas prices")]
    GetGasPrice,
    #[command(description = "Show current ETH price")]
    GetEthPrice,
    #[command(description = "Set gas price alert in gwei. Usage: /gas_alert 20")]
    GasAlert(String),
    #[command(description = "Cancel alert input")]
    Cancel,
    #[command(description = "Show help")]
    Help,
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
    db: Database,
    snapshots: SnapshotReader,
    /// Chats that were asked for a threshold and haven't answered yet.
    awaiting_threshold: Mutex<HashSet<ChatId>>,
}

impl TelegramBot {
    /// Create a new bot with the given token.
    pub fn new(token: &str, db: Database, snapshots: SnapshotReader) -> Self {
        Self {
            bot: Bot::new(token),
            db,
            snapshots,
            awaiting_threshold: Mutex::new(HashSet::new()),
        }
    }

    /// Run the bot update handler until the dispatcher stops.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();
        let commands = Arc::clone(&self);
        let replies = Arc::clone(&self);

        let handler = Update::filter_message()
            .branch(dptree::entry().filter_command::<Command>().endpoint(
                move |bot: Bot, msg: Message, cmd: Command| {
                    let this = Arc::clone(&commands);
                    async move { this.handle_command(bot, msg, cmd).await }
                },
            ))
            .branch(dptree::endpoint(move |bot: Bot, msg: Message| {
                let this = Arc::clone(&replies);
                async move { this.handle_text(bot, msg).await }
            }));

        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    async fn handle_command(
        &self,
        bot: Bot,
        msg: Message,
        cmd: Command,
    ) -> Result<(), TelegramError> {
        let chat_id = msg.chat.id;

        match cmd {
            Command::Start => {
                bot.send_message(chat_id, "Hi!")
                    .reply_markup(main_keyboard())
                    .await?;
            }

            Command::GetGasPrice => {
                let snapshot = self.snapshots.current();
                bot.send_message(chat_id, gas_price_reply(snapshot.as_deref()))
                    .await?;
            }

            Command::GetEthPrice => {
                let snapshot = self.snapshots.current();
                bot.send_message(chat_id, eth_price_reply(snapshot.as_deref()))
                    .await?;
            }

            Command::GasAlert(value) => {
                let value = value.trim();
                if value.is_empty() {
                    let current = self.current_threshold(chat_id).await;
                    self.awaiting_threshold.lock().await.insert(chat_id);
                    bot.send_message(chat_id, threshold_prompt(current)).await?;
                } else {
                    self.save_threshold(&bot, chat_id, value).await?;
                }
            }

            Command::Cancel => {
                self.awaiting_threshold.lock().await.remove(&chat_id);
                bot.send_message(chat_id, "Cancelled.").await?;
            }

            Command::Help => {
                bot.send_message(chat_id, Command::descriptions().to_string())
                    .await?;
            }
        }

        Ok(())
    }

    /// Plain text: only meaningful as the answer to a threshold prompt.
    async fn handle_text(&self, bot: Bot, msg: Message) -> Result<(), TelegramError> {
        let Some(text) = msg.text() else {
            return Ok(());
        };

        let awaiting = self.awaiting_threshold.lock().await.contains(&msg.chat.id);
        if awaiting {
            self.save_threshold(&bot, msg.chat.id, text).await?;
        }
        Ok(())
    }

    async fn save_threshold(
        &self,
        bot: &Bot,
        chat_id: ChatId,
        text: &str,
    ) -> Result<(), TelegramError> {
        let Some(threshold) = parse_threshold(text) else {
            self.awaiting_threshold.lock().await.insert(chat_id);
            bot.send_message(chat_id, THRESHOLD_INVALID).await?;
            return Ok(());
        };

        self.awaiting_threshold.lock().await.remove(&chat_id);

        let saved = self
            .db
            .upsert_subscription(&chat_id.to_string(), threshold)
            .await;
        match &saved {
            Ok(()) => info!(chat = %chat_id, threshold_gwei = threshold, "Gas alert registered"),
            Err(e) => error!(chat = %chat_id, error = %e, "Failed to save gas alert"),
        }

        bot.send_message(chat_id, save_reply(&saved, threshold))
            .await?;
        Ok(())
    }

    /// Stored threshold for a chat; lookup failures are logged and treated as none.
    async fn current_threshold(&self, chat_id: ChatId) -> Option<i64> {
        match self.db.get_subscription(&chat_id.to_string()).await {
            Ok(subscription) => subscription.map(|s| s.threshold_gwei),
            Err(e) => {
                warn!(chat = %chat_id, error = %e, "Failed to load gas alert");
                None
            }
        }
    }
}

#[async_trait]
impl AlertSink for TelegramBot {
    async fn send_alert(&self, subscriber_id: &str, message: &str) -> Result<(), DeliveryError> {
        let chat_id = subscriber_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| DeliveryError(format!("invalid chat id: {}", subscriber_id)))?;

        self.bot
            .send_message(chat_id, message)
            .await
            .map_err(|e| DeliveryError(e.to_string()))?;
        Ok(())
    }
}

fn main_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new("/get_gas_price")],
        vec![KeyboardButton::new("/gas_alert")],
    ])
}

/// Parse a user supplied threshold: a non-negative whole number of gwei.
pub fn parse_threshold(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok().filter(|v| *v >= 0)
}

/// Reply to `/get_gas_price`.
pub fn gas_price_reply(snapshot: Option<&PriceSnapshot>) -> String {
    snapshot.map_or_else(|| NOT_READY.to_string(), format_snapshot)
}

/// Reply to `/get_eth_price`.
pub fn eth_price_reply(snapshot: Option<&PriceSnapshot>) -> String {
    snapshot.map_or_else(|| NOT_READY.to_string(), format_eth_price)
}

/// Prompt for a threshold, mentioning the one already stored.
pub fn threshold_prompt(current: Option<i64>) -> String {
    match current {
        Some(threshold) => format!("Current alert: {} gwei\n{}", threshold, THRESHOLD_PROMPT),
        None => THRESHOLD_PROMPT.to_string(),
    }
}

/// Reply after trying to store a threshold.
pub fn save_reply(saved: &Result<(), StoreError>, threshold: i64) -> String {
    match saved {
        Ok(()) => format!("Written: {}", threshold),
        Err(_) => SAVE_FAILED.to_string(),
    }
}

/// Format the current gas prices for display.
pub fn format_snapshot(snapshot: &PriceSnapshot) -> String {
    let mut text = format!("Ethereum price {:.2}$\n\n", snapshot.usd_per_eth());
    for tier in snapshot.tiers() {
        text.push_str(&format!(
            "{}: {} gwei {:.2}$\n\n",
            tier.kind.label(),
            tier.rate_gwei,
            tier.cost_usd
        ));
    }
    text.truncate(text.trim_end().len());
    text
}

/// Format the ETH price for display.
pub fn format_eth_price(snapshot: &PriceSnapshot) -> String {
    format!("Ethereum price {:.2}$", snapshot.usd_per_eth())
}

/// Format a gas alert notification.
pub fn format_alert_message(rate_gwei: u64, cost_usd: f64) -> String {
    format!("Gas price is {} gwei or {:.2}$", rate_gwei, cost_usd)
}
