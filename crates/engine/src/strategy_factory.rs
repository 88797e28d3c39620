use std::sync::Arc;

use app_config::Settings;
use core_types::Symbol;
use strategies::types::{
    GridSettings, MaCrossoverSettings, MacdBollingerSettings, MomentumSettings,
    RsiReversionSettings,
};
use strategies::{
    AiValidated, Grid, MaCrossover, MacdBollinger, Momentum, RsiReversion, SignalValidator,
    Strategy,
};
use tracing::{error, info};

/// Builds the strategies declared in configuration: one instance per
/// (enabled pair, strategy name). Unknown names are logged and skipped.
///
/// When AI validation is enabled and a validator is supplied, every strategy
/// is wrapped so its signals pass through the validator first.
pub fn build_strategies(
    settings: &Settings,
    validator: Option<Arc<dyn SignalValidator>>,
) -> Vec<Strategy> {
    let mut built = Vec::new();

    for pair in &settings.pairs {
        if !pair.enabled {
            info!(symbol = %pair.symbol, "pair disabled, skipping");
            continue;
        }
        let symbol = Symbol(pair.symbol.clone());

        for name in &pair.strategies {
            let Some(strategy) =
                build_one(name, symbol.clone(), pair.timeframe.clone(), settings)
            else {
                error!(name = %name, symbol = %symbol, "unknown strategy name");
                continue;
            };

            let strategy = match (&validator, settings.ai.enabled) {
                (Some(validator), true) => Strategy::AiValidated(AiValidated::new(
                    strategy,
                    validator.clone(),
                    settings.ai.confidence_threshold,
                )),
                _ => strategy,
            };

            built.push(strategy);
        }
    }

    built
}

fn build_one(
    name: &str,
    symbol: Symbol,
    timeframe: String,
    settings: &Settings,
) -> Option<Strategy> {
    let blocks = &settings.strategies;
    let strategy = match name {
        "ma_crossover" => Strategy::MaCrossover(MaCrossover::new(
            symbol,
            timeframe,
            blocks
                .ma_crossover
                .clone()
                .unwrap_or_else(MaCrossoverSettings::default),
        )),
        "rsi_reversion" => Strategy::RsiReversion(RsiReversion::new(
            symbol,
            timeframe,
            blocks
                .rsi_reversion
                .clone()
                .unwrap_or_else(RsiReversionSettings::default),
        )),
        "momentum" => Strategy::Momentum(Momentum::new(
            symbol,
            timeframe,
            blocks
                .momentum
                .clone()
                .unwrap_or_else(MomentumSettings::default),
        )),
        "macd_bollinger" => Strategy::MacdBollinger(MacdBollinger::new(
            symbol,
            timeframe,
            blocks
                .macd_bollinger
                .clone()
                .unwrap_or_else(MacdBollingerSettings::default),
        )),
        "grid" => Strategy::Grid(Grid::new(
            symbol,
            timeframe,
            blocks.grid.clone().unwrap_or_else(GridSettings::default),
        )),
        _ => return None,
    };
    Some(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_config::{
        AiSettings, AppSettings, DatabaseSettings, ExchangeSettings, PairSettings,
        StrategySettings, TradingSettings,
    };
    use rust_decimal::Decimal;

    fn settings(pairs: Vec<PairSettings>, ai_enabled: bool) -> Settings {
        Settings {
            app: AppSettings {
                environment: "test".to_string(),
                log_level: "info".to_string(),
            },
            exchange: ExchangeSettings {
                name: "binance".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                rest_base_url: "http://localhost".to_string(),
            },
            database: DatabaseSettings {
                url: "sqlite::memory:".to_string(),
            },
            trading: TradingSettings {
                paper_trading: true,
                initial_balance: Decimal::from(10_000),
                update_interval_secs: 60,
                position_check_interval_secs: 10,
                fee_rate: Decimal::new(1, 3),
            },
            risk: risk::RiskSettings::default(),
            strategies: StrategySettings::default(),
            pairs,
            ai: AiSettings {
                enabled: ai_enabled,
                confidence_threshold: 60,
            },
        }
    }

    fn pair(symbol: &str, strategies: &[&str], enabled: bool) -> PairSettings {
        PairSettings {
            symbol: symbol.to_string(),
            timeframe: "1h".to_string(),
            enabled,
            strategies: strategies.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn builds_one_strategy_per_pair_and_name() {
        let settings = settings(
            vec![
                pair("BTC/USDT", &["ma_crossover", "momentum"], true),
                pair("ETH/USDT", &["grid"], true),
            ],
            false,
        );

        let built = build_strategies(&settings, None);
        assert_eq!(built.len(), 3);
        let names: Vec<String> = built.iter().map(|s| s.name()).collect();
        assert!(names.contains(&"ma_crossover".to_string()));
        assert!(names.contains(&"momentum".to_string()));
        assert!(names.contains(&"grid".to_string()));
    }

    #[test]
    fn disabled_pairs_and_unknown_names_are_skipped() {
        let settings = settings(
            vec![
                pair("BTC/USDT", &["ma_crossover"], false),
                pair("ETH/USDT", &["does_not_exist", "rsi_reversion"], true),
            ],
            false,
        );

        let built = build_strategies(&settings, None);
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].name(), "rsi_reversion");
    }
}
