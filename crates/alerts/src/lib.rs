//! Gas price alerts.
//!
//! This crate provides:
//! - SQLite-based subscription storage
//! - Threshold matching and alert fan-out
//! - Telegram bot integration for commands and notifications

pub mod config;
pub mod db;
pub mod dispatcher;
pub mod telegram;

pub use config::{Comparison, Subscription};
pub use db::{Database, StoreError};
pub use dispatcher::{
    AlertDispatcher, AlertSink, DeliveryError, DispatchError, DispatchOutcome, DispatcherConfig,
};
pub use telegram::TelegramBot;
