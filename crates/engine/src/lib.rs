pub mod bot;
pub mod strategy_factory;

pub use bot::{BotConfig, BotStatus, Health, HealthStatus, TradingBot};
pub use strategy_factory::build_strategies;
