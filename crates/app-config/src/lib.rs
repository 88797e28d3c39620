use config::{Config, Environment, File};

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    AiSettings, AppSettings, DatabaseSettings, ExchangeSettings, PairSettings, Settings,
    StrategySettings, TradingSettings,
};

/// Loads the application settings from layered sources:
/// 1. `config/base.toml`
/// 2. `config/{APP_ENVIRONMENT}.toml` (optional)
/// 3. Environment variables with prefix `APP` and separator `__`,
///    e.g. `APP_DATABASE__URL=...`.
pub fn load_settings() -> Result<Settings> {
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name("config/base"))
        .add_source(File::with_name(&format!("config/{}", environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_settings_deserialize_from_toml() {
        let toml = r#"
            [app]
            environment = "development"
            log_level = "info"

            [exchange]
            name = "binance"
            rest_base_url = "https://testnet.binance.vision"

            [database]
            url = "sqlite::memory:"

            [trading]
            initial_balance = 10000.0

            [risk]
            max_position_size = 1000.0
            risk_per_trade = 0.02
            max_daily_loss = 100.0
            max_open_positions = 5

            [strategies.ma_crossover]
            fast_period = 9
            slow_period = 21

            [[pairs]]
            symbol = "BTC/USDT"
            strategies = ["ma_crossover"]
        "#;

        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(settings.trading.paper_trading);
        assert_eq!(settings.trading.update_interval_secs, 60);
        assert_eq!(settings.trading.position_check_interval_secs, 10);
        assert!(settings.strategies.ma_crossover.is_some());
        assert_eq!(settings.pairs.len(), 1);
        assert_eq!(settings.pairs[0].timeframe, "1h");
        assert!(settings.pairs[0].enabled);
        assert!(!settings.ai.enabled);
    }
}
