use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use engine::{BotConfig, TradingBot, build_strategies};
use events::EventBus;
use exchange_client::BinanceClient;
use tracing_subscriber::prelude::*;

mod event_layer;

use event_layer::EventBridgeLayer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "An algorithmic crypto trading bot.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the trading bot in paper or live mode (the default).
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let events = EventBus::default();

    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("sqlx::query", tracing::Level::WARN)
            .with_default(tracing::Level::INFO),
    );
    let event_layer = EventBridgeLayer::new(events.clone()).with_filter(
        tracing_subscriber::filter::LevelFilter::INFO,
    );
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(event_layer)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(events).await?,
    }

    Ok(())
}

async fn run(events: EventBus) -> Result<()> {
    let settings = app_config::load_settings()?;
    tracing::info!(environment = %settings.app.environment, "settings loaded");

    let db = database::connect(&settings.database).await?;
    let exchange = Arc::new(BinanceClient::new(&settings.exchange));

    let bot = TradingBot::new(
        BotConfig::from_settings(&settings),
        exchange,
        db,
        events,
    );

    let strategies = build_strategies(&settings, None);
    if strategies.is_empty() {
        anyhow::bail!("no strategies configured; check the [[pairs]] sections");
    }
    for strategy in strategies {
        bot.add_strategy(strategy).await;
    }

    bot.start().await;
    tracing::info!("bot running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    bot.stop().await;

    Ok(())
}
