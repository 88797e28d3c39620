use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// How the position size for a new trade is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    /// A fixed quote-currency notional per trade.
    Fixed,
    /// A percentage of the portfolio value per trade.
    Percentage,
    /// Size derived from the distance to the stop-loss.
    RiskBased,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskSettings {
    /// Maximum quote-currency notional for a single position.
    pub max_position_size: Decimal,
    /// Fraction of portfolio value risked per trade, e.g. 0.02.
    pub risk_per_trade: Decimal,
    /// Daily realized loss (quote currency) at which new entries stop.
    pub max_daily_loss: Decimal,
    pub max_open_positions: usize,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_risk_reward_ratio")]
    pub risk_reward_ratio: Decimal,
    #[serde(default = "default_sizing_method")]
    pub sizing_method: SizingMethod,
}

fn default_stop_loss_pct() -> Decimal {
    dec!(0.02)
}

fn default_risk_reward_ratio() -> Decimal {
    dec!(2.0)
}

fn default_sizing_method() -> SizingMethod {
    SizingMethod::Percentage
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_position_size: dec!(1000),
            risk_per_trade: dec!(0.02),
            max_daily_loss: dec!(100),
            max_open_positions: 5,
            stop_loss_pct: default_stop_loss_pct(),
            risk_reward_ratio: default_risk_reward_ratio(),
            sizing_method: default_sizing_method(),
        }
    }
}
