use core_types::Side;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::error::{Error, Result};
use crate::settings::{RiskSettings, SizingMethod};

/// Pre-trade gatekeeping and position sizing.
///
/// `daily_pnl` tracks realized P&L since the last reset; a breach of the
/// daily loss limit stops new entries until `reset_daily_pnl` is called.
pub struct RiskManager {
    settings: RiskSettings,
    daily_pnl: Decimal,
}

impl RiskManager {
    pub fn new(settings: RiskSettings) -> Self {
        Self {
            settings,
            daily_pnl: Decimal::ZERO,
        }
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// Checks whether a new position is allowed. Checks run in order and the
    /// first failing one becomes the veto reason.
    pub fn can_open_position(&self, open_count: usize, position_value: Decimal) -> Result<()> {
        if open_count >= self.settings.max_open_positions {
            return Err(Error::Vetoed {
                reason: format!(
                    "open position limit reached ({}/{})",
                    open_count, self.settings.max_open_positions
                ),
            });
        }

        if self.daily_pnl <= -self.settings.max_daily_loss {
            return Err(Error::Vetoed {
                reason: format!(
                    "daily loss limit breached ({} <= -{})",
                    self.daily_pnl, self.settings.max_daily_loss
                ),
            });
        }

        if position_value > self.settings.max_position_size {
            return Err(Error::Vetoed {
                reason: format!(
                    "position value {} exceeds max {}",
                    position_value, self.settings.max_position_size
                ),
            });
        }

        Ok(())
    }

    /// Position size in base-currency units for an entry at `entry_price`.
    ///
    /// All methods cap the notional at `max_position_size`.
    pub fn calculate_position_size(
        &self,
        portfolio_value: Decimal,
        entry_price: Decimal,
        stop_loss: Option<Decimal>,
    ) -> Decimal {
        if entry_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let fallback_notional = self.settings.max_position_size * dec!(0.1);

        let notional = match self.settings.sizing_method {
            SizingMethod::Fixed => self
                .settings
                .max_position_size
                .min(portfolio_value * dec!(0.1)),
            SizingMethod::Percentage => portfolio_value * self.settings.risk_per_trade,
            SizingMethod::RiskBased => match stop_loss {
                Some(stop) if (entry_price - stop).abs() > Decimal::ZERO => {
                    let risk_amount = portfolio_value * self.settings.risk_per_trade;
                    let per_unit_risk = (entry_price - stop).abs();
                    (risk_amount / per_unit_risk * entry_price)
                        .min(self.settings.max_position_size)
                }
                _ => fallback_notional,
            },
        };

        let notional = notional.min(self.settings.max_position_size);
        debug!(%notional, %entry_price, "calculated position size");
        notional / entry_price
    }

    /// Stop-loss price at the configured distance from entry.
    pub fn calculate_stop_loss(&self, entry_price: Decimal, side: Side) -> Decimal {
        match side {
            Side::Long => entry_price * (Decimal::ONE - self.settings.stop_loss_pct),
            Side::Short => entry_price * (Decimal::ONE + self.settings.stop_loss_pct),
        }
    }

    /// Take-profit price derived from the stop distance and the configured
    /// risk/reward ratio.
    pub fn calculate_take_profit(
        &self,
        entry_price: Decimal,
        stop_loss: Decimal,
        side: Side,
    ) -> Decimal {
        let risk = (entry_price - stop_loss).abs();
        let reward = risk * self.settings.risk_reward_ratio;
        match side {
            Side::Long => entry_price + reward,
            Side::Short => entry_price - reward,
        }
    }

    pub fn update_daily_pnl(&mut self, realized: Decimal) {
        self.daily_pnl += realized;
    }

    pub fn reset_daily_pnl(&mut self) {
        self.daily_pnl = Decimal::ZERO;
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RiskSettings {
        RiskSettings {
            max_position_size: dec!(1000),
            risk_per_trade: dec!(0.02),
            max_daily_loss: dec!(100),
            max_open_positions: 3,
            ..RiskSettings::default()
        }
    }

    #[test]
    fn vetoes_when_position_limit_reached() {
        let manager = RiskManager::new(settings());
        assert!(manager.can_open_position(3, dec!(100)).is_err());
        assert!(manager.can_open_position(2, dec!(100)).is_ok());
    }

    #[test]
    fn vetoes_after_daily_loss_breach() {
        let mut manager = RiskManager::new(settings());
        manager.update_daily_pnl(dec!(-150));
        assert!(manager.can_open_position(0, dec!(100)).is_err());

        manager.reset_daily_pnl();
        assert!(manager.can_open_position(0, dec!(100)).is_ok());
    }

    #[test]
    fn vetoes_oversized_position() {
        let manager = RiskManager::new(settings());
        let err = manager.can_open_position(0, dec!(1500)).unwrap_err();
        assert!(err.to_string().contains("exceeds max"));
    }

    #[test]
    fn percentage_sizing_scales_with_portfolio() {
        let manager = RiskManager::new(settings());
        // 10000 * 0.02 = 200 quote, at price 100 -> 2 units.
        let size = manager.calculate_position_size(dec!(10000), dec!(100), None);
        assert_eq!(size, dec!(2));
    }

    #[test]
    fn risk_based_sizing_uses_stop_distance() {
        let manager = RiskManager::new(RiskSettings {
            sizing_method: SizingMethod::RiskBased,
            ..settings()
        });
        // risk 200, stop distance 5 -> 40 units -> notional 4000, capped
        // at 1000 -> 10 units.
        let size = manager.calculate_position_size(dec!(10000), dec!(100), Some(dec!(95)));
        assert_eq!(size, dec!(10));
    }

    #[test]
    fn risk_based_falls_back_without_stop() {
        let manager = RiskManager::new(RiskSettings {
            sizing_method: SizingMethod::RiskBased,
            ..settings()
        });
        // Fallback is 10% of max notional: 100 quote at price 50 -> 2 units.
        let size = manager.calculate_position_size(dec!(10000), dec!(50), None);
        assert_eq!(size, dec!(2));
    }

    #[test]
    fn stop_and_take_profit_bracket_entry() {
        let manager = RiskManager::new(settings());
        let stop = manager.calculate_stop_loss(dec!(100), Side::Long);
        assert_eq!(stop, dec!(98.00));
        let target = manager.calculate_take_profit(dec!(100), stop, Side::Long);
        assert_eq!(target, dec!(104.00));

        let stop = manager.calculate_stop_loss(dec!(100), Side::Short);
        assert_eq!(stop, dec!(102.00));
        let target = manager.calculate_take_profit(dec!(100), stop, Side::Short);
        assert_eq!(target, dec!(96.00));
    }

    #[test]
    fn zero_entry_price_sizes_to_zero() {
        let manager = RiskManager::new(settings());
        assert_eq!(
            manager.calculate_position_size(dec!(10000), Decimal::ZERO, None),
            Decimal::ZERO
        );
    }
}
