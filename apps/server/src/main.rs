//! Gas Alert Bot - Headless Server
//!
//! Polls Ethereum gas prices and notifies Telegram subscribers when the
//! average rate reaches their threshold.

mod config;
mod scheduler;
mod state;

use clap::Parser;
use config::AppConfig;
use scheduler::spawn_periodic;
use state::RuntimeStats;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use gasalert_alerts::{
    AlertDispatcher, AlertSink, Comparison, Database, DispatchOutcome, DispatcherConfig,
    TelegramBot,
};
use gasalert_core::TierKind;
use gasalert_feeds::{EtherscanClient, EtherscanConfig, PollerConfig, PricePoller};

/// Gas Alert Bot CLI
#[derive(Parser, Debug)]
#[command(name = "gas-alert-bot")]
#[command(about = "Telegram bot for Ethereum gas price alerts", long_about = None)]
struct Args {
    /// Seconds between gas price polls
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 12)]
    poll_interval_secs: u64,

    /// Seconds between alert dispatch cycles
    #[arg(long, env = "DISPATCH_INTERVAL_SECS", default_value_t = 60)]
    dispatch_interval_secs: u64,

    /// Timeout for each Etherscan request, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    fetch_timeout_secs: u64,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    /// Apply command line overrides on top of the environment config.
    fn apply(&self, config: &mut AppConfig) {
        config.poll.period = Duration::from_secs(self.poll_interval_secs);
        config.dispatch.period = Duration::from_secs(self.dispatch_interval_secs);
        config.fetch_timeout = Duration::from_secs(self.fetch_timeout_secs);
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_logging(level: &str) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn load_config(args: &Args) -> Result<AppConfig, config::ConfigError> {
    let mut config = AppConfig::from_env()?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run_poll_cycle(poller: &PricePoller, stats: &RuntimeStats) {
    // The poller logs each cycle itself and keeps the last snapshot on failure.
    stats.record_poll(poller.poll_once().await.is_ok());
}

async fn run_dispatch_cycle(dispatcher: &AlertDispatcher, stats: &RuntimeStats) {
    match dispatcher.run_cycle().await {
        Ok(DispatchOutcome::NoSnapshot) => {}
        Ok(DispatchOutcome::Dispatched {
            delivered, failed, ..
        }) => stats.record_dispatch(delivered, failed),
        Err(e) => {
            stats.record_dispatch_error();
            error!(error = %e, "Alert dispatch failed");
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("⛽ Gas Alert Bot starting...");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    debug!(?config, "Configuration loaded");

    let db = match Database::connect(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open subscription store: {}", e);
            std::process::exit(1);
        }
    };
    match db.count_subscriptions().await {
        Ok(count) => info!("📋 Loaded {} gas alert subscriptions", count),
        Err(e) => warn!("Failed to count subscriptions: {}", e),
    }

    let etherscan = EtherscanConfig::new(config.etherscan_api_key.clone())
        .with_base_url(config.etherscan_url.clone())
        .with_timeout(config.fetch_timeout);
    let oracle = match EtherscanClient::new(etherscan) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create Etherscan client: {}", e);
            std::process::exit(1);
        }
    };

    let poller = Arc::new(PricePoller::new(
        oracle,
        PollerConfig {
            fetch_timeout: config.fetch_timeout,
        },
    ));

    let bot = Arc::new(TelegramBot::new(
        &config.telegram_token,
        db.clone(),
        poller.reader(),
    ));
    let sink: Arc<dyn AlertSink> = bot.clone();

    let dispatcher = Arc::new(AlertDispatcher::new(
        db.clone(),
        poller.reader(),
        sink,
        DispatcherConfig {
            tier: TierKind::Average,
            comparison: Comparison::RateAtOrAbove,
        },
    ));

    let stats = Arc::new(RuntimeStats::new());
    let cancel = CancellationToken::new();

    info!(
        "📊 Polling every {}s, dispatching alerts every {}s",
        config.poll.period.as_secs(),
        config.dispatch.period.as_secs()
    );

    let poll_handle = {
        let poller = poller.clone();
        let stats = stats.clone();
        spawn_periodic("price_poller", config.poll, cancel.clone(), move || {
            let poller = poller.clone();
            let stats = stats.clone();
            async move { run_poll_cycle(&poller, &stats).await }
        })
    };

    let dispatch_handle = {
        let dispatcher = dispatcher.clone();
        let stats = stats.clone();
        spawn_periodic(
            "alert_dispatcher",
            config.dispatch,
            cancel.clone(),
            move || {
                let dispatcher = dispatcher.clone();
                let stats = stats.clone();
                async move { run_dispatch_cycle(&dispatcher, &stats).await }
            },
        )
    };

    let mut bot_handle = tokio::spawn(bot.run());

    // Handle shutdown
    info!("Press Ctrl+C to stop...");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    warn!("Shutdown signal received");
    cancel.cancel();

    // Wait for tasks with timeout, then abort
    let _ = tokio::time::timeout(Duration::from_secs(2), poll_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), dispatch_handle).await;
    if tokio::time::timeout(Duration::from_secs(2), &mut bot_handle)
        .await
        .is_err()
    {
        warn!("Telegram dispatcher did not stop in time");
        bot_handle.abort();
    }

    db.close().await;

    // Final stats
    let summary = stats.summary();
    info!("📈 Final Stats:");
    info!("  Total uptime: {} seconds", summary.uptime_secs);
    info!(
        "  Polls: {} ok, {} failed",
        summary.polls_succeeded, summary.polls_failed
    );
    info!(
        "  Dispatch cycles: {} ({} errors)",
        summary.dispatch_cycles, summary.dispatch_errors
    );
    info!(
        "  Alerts: {} sent, {} failed",
        summary.alerts_sent, summary.alerts_failed
    );

    info!("👋 Gas Alert Bot stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use config::Schedule;
    use gasalert_alerts::DeliveryError;
    use gasalert_core::FeeRates;
    use gasalert_feeds::{FeedError, PriceOracle};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct FixedOracle {
        rates: Mutex<Option<FeeRates>>,
        usd_per_eth: f64,
    }

    #[async_trait]
    impl PriceOracle for FixedOracle {
        async fn fetch_fee_tiers(&self) -> Result<FeeRates, FeedError> {
            (*self.rates.lock().unwrap())
                .ok_or_else(|| FeedError::Upstream("NOTOK".to_string()))
        }

        async fn fetch_usd_price(&self) -> Result<f64, FeedError> {
            Ok(self.usd_per_eth)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send_alert(&self, subscriber_id: &str, message: &str) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((subscriber_id.to_string(), message.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["gas-alert-bot"]).unwrap();
        assert_eq!(args.poll_interval_secs, 12);
        assert_eq!(args.dispatch_interval_secs, 60);
        assert_eq!(args.fetch_timeout_secs, 10);
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::try_parse_from([
            "gas-alert-bot",
            "--poll-interval-secs",
            "5",
            "--dispatch-interval-secs",
            "30",
            "--fetch-timeout-secs",
            "3",
        ])
        .unwrap();

        let mut config = AppConfig::from_lookup(|name| match name {
            "TELEGRAM_TOKEN" => Some("123:abc".to_string()),
            "ETHERSCAN_API" => Some("KEY".to_string()),
            _ => None,
        })
        .unwrap();
        args.apply(&mut config);

        assert_eq!(config.poll.period, Duration::from_secs(5));
        assert_eq!(config.poll.first_delay, Duration::from_secs(1));
        assert_eq!(config.dispatch.period, Duration::from_secs(30));
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_poll_cycle_records_stats() {
        let oracle = Arc::new(FixedOracle {
            rates: Mutex::new(Some(FeeRates::new(15, 20, 30))),
            usd_per_eth: 2000.0,
        });
        let poller = PricePoller::new(oracle.clone(), PollerConfig::default());
        let stats = RuntimeStats::new();

        run_poll_cycle(&poller, &stats).await;
        *oracle.rates.lock().unwrap() = None;
        run_poll_cycle(&poller, &stats).await;

        let summary = stats.summary();
        assert_eq!(summary.polls_succeeded, 1);
        assert_eq!(summary.polls_failed, 1);
        assert_eq!(poller.current().unwrap().average().rate_gwei, 20);
    }

    #[tokio::test]
    async fn test_scheduled_poll_and_dispatch() {
        let oracle = Arc::new(FixedOracle {
            rates: Mutex::new(Some(FeeRates::new(20, 25, 35))),
            usd_per_eth: 2000.0,
        });
        let poller = Arc::new(PricePoller::new(oracle, PollerConfig::default()));
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.upsert_subscription("42", 20).await.unwrap();
        db.upsert_subscription("43", 30).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(AlertDispatcher::new(
            db,
            poller.reader(),
            sink.clone(),
            DispatcherConfig::default(),
        ));
        let stats = Arc::new(RuntimeStats::new());
        let cancel = CancellationToken::new();

        let poll_handle = {
            let (poller, stats) = (poller.clone(), stats.clone());
            spawn_periodic(
                "poll",
                Schedule {
                    first_delay: Duration::from_millis(10),
                    period: Duration::from_millis(50),
                },
                cancel.clone(),
                move || {
                    let (poller, stats) = (poller.clone(), stats.clone());
                    async move { run_poll_cycle(&poller, &stats).await }
                },
            )
        };
        let dispatch_handle = {
            let (dispatcher, stats) = (dispatcher.clone(), stats.clone());
            spawn_periodic(
                "dispatch",
                Schedule {
                    first_delay: Duration::from_millis(150),
                    period: Duration::from_secs(60),
                },
                cancel.clone(),
                move || {
                    let (dispatcher, stats) = (dispatcher.clone(), stats.clone());
                    async move { run_dispatch_cycle(&dispatcher, &stats).await }
                },
            )
        };

        // Past the first dispatch but well before the second.
        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel.cancel();
        poll_handle.await.unwrap();
        dispatch_handle.await.unwrap();

        assert_eq!(
            sink.sent.lock().unwrap().clone(),
            vec![("42".to_string(), "Gas price is 25 gwei or 1.05$".to_string())]
        );
        let summary = stats.summary();
        assert!(summary.polls_succeeded >= 1);
        assert_eq!(summary.polls_failed, 0);
        assert_eq!(summary.dispatch_cycles, 1);
        assert_eq!(summary.alerts_sent, 1);
    }
}
