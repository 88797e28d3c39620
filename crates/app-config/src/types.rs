use risk::RiskSettings;
use rust_decimal::Decimal;
use serde::Deserialize;
use strategies::types::{
    GridSettings, MaCrossoverSettings, MacdBollingerSettings, MomentumSettings,
    RsiReversionSettings,
};

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub exchange: ExchangeSettings,
    pub database: DatabaseSettings,
    pub trading: TradingSettings,
    pub risk: RiskSettings,
    #[serde(default)]
    pub strategies: StrategySettings,
    #[serde(default)]
    pub pairs: Vec<PairSettings>,
    #[serde(default)]
    pub ai: AiSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g. "development").
    pub environment: String,
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExchangeSettings {
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    pub rest_base_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    /// SQLite connection URL, e.g. "sqlite://data/meridian.db".
    pub url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TradingSettings {
    #[serde(default = "default_paper_trading")]
    pub paper_trading: bool,
    pub initial_balance: Decimal,
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    #[serde(default = "default_position_check_interval")]
    pub position_check_interval_secs: u64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
}

fn default_paper_trading() -> bool {
    true
}

fn default_update_interval() -> u64 {
    60
}

fn default_position_check_interval() -> u64 {
    10
}

fn default_fee_rate() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}

/// Each strategy gets its own optional settings block.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct StrategySettings {
    pub ma_crossover: Option<MaCrossoverSettings>,
    pub rsi_reversion: Option<RsiReversionSettings>,
    pub momentum: Option<MomentumSettings>,
    pub macd_bollinger: Option<MacdBollingerSettings>,
    pub grid: Option<GridSettings>,
}

/// One tradable pair and the strategies assigned to it.
#[derive(Deserialize, Debug, Clone)]
pub struct PairSettings {
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub strategies: Vec<String>,
}

fn default_timeframe() -> String {
    "1h".to_string()
}

fn default_enabled() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone)]
pub struct AiSettings {
    pub enabled: bool,
    pub confidence_threshold: u8,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence_threshold: 60,
        }
    }
}
