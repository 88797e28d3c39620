use std::collections::HashMap;

use chrono::Utc;
use core_types::{CloseReason, Position, Side, Symbol};
use database::Db;
use risk::RiskManager;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::stats::PortfolioStats;

/// Everything needed to open a position.
pub struct NewPosition {
    pub exchange: String,
    pub symbol: Symbol,
    pub side: Side,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub strategy_name: String,
    pub is_paper_trade: bool,
    pub entry_trade_id: Option<i64>,
}

/// Tracks open positions and the cash balance, persisting every change.
///
/// Managers are cheap to build and short-lived: each trading pass constructs
/// one, initializes it from storage, and drops it when done. Storage is the
/// source of truth for open positions.
pub struct PortfolioManager {
    db: Db,
    risk: RiskManager,
    positions: HashMap<String, Position>,
    initial_balance: Decimal,
    current_balance: Decimal,
}

impl PortfolioManager {
    pub fn new(db: Db, risk: RiskManager, initial_balance: Decimal) -> Self {
        Self {
            db,
            risk,
            positions: HashMap::new(),
            initial_balance,
            current_balance: initial_balance,
        }
    }

    /// Loads open positions and today's realized P&L from storage, and sets
    /// the working balance. A storage failure here is logged but not fatal:
    /// the bot can still trade, it just starts without its position map.
    pub async fn initialize(&mut self, balance: Decimal) {
        self.current_balance = balance;

        // Managers are rebuilt per pass; the daily loss gate has to be
        // re-seeded from storage or it would reset every session.
        match self.daily_pnl().await {
            Ok(daily) => self.risk.update_daily_pnl(daily),
            Err(err) => warn!(error = %err, "failed to load daily realized pnl"),
        }

        match self.db.get_open_positions().await {
            Ok(positions) => {
                for position in positions {
                    self.positions.insert(position.key(), position);
                }
                info!(
                    positions = self.positions.len(),
                    balance = %self.current_balance,
                    "portfolio initialized"
                );
            }
            Err(err) => {
                error!(error = %err, "failed to load open positions, starting empty");
            }
        }
    }

    /// Opens and persists a new position. The (exchange, symbol) uniqueness
    /// is enforced by storage and surfaces here as an error.
    pub async fn open_position(&mut self, new: NewPosition) -> Result<Position> {
        if new.amount <= Decimal::ZERO {
            return Err(Error::InvalidPosition(format!(
                "amount must be positive, got {}",
                new.amount
            )));
        }
        if new.entry_price <= Decimal::ZERO {
            return Err(Error::InvalidPosition(format!(
                "entry price must be positive, got {}",
                new.entry_price
            )));
        }

        let now = Utc::now();
        let mut position = Position {
            id: 0,
            exchange: new.exchange,
            symbol: new.symbol,
            side: new.side,
            amount: new.amount,
            entry_price: new.entry_price,
            current_price: new.entry_price,
            leverage: Decimal::ONE,
            stop_loss: new.stop_loss,
            take_profit: new.take_profit,
            trailing_stop: None,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            strategy_name: new.strategy_name,
            is_open: true,
            is_paper_trade: new.is_paper_trade,
            opened_at: now,
            updated_at: now,
            closed_at: None,
            entry_trade_id: new.entry_trade_id,
            exit_trade_id: None,
        };
        position.update_pnl(new.entry_price);

        position.id = self.db.insert_position(&position).await?;
        info!(
            id = position.id,
            symbol = %position.symbol,
            side = position.side.as_str(),
            amount = %position.amount,
            entry = %position.entry_price,
            "position opened"
        );
        self.positions.insert(position.key(), position.clone());
        Ok(position)
    }

    /// Closes a position at `exit_price`, persists it, and returns the
    /// realized P&L. The balance and daily P&L move by the realized amount.
    pub async fn close_position(
        &mut self,
        mut position: Position,
        exit_price: Decimal,
        exit_trade_id: Option<i64>,
    ) -> Result<Decimal> {
        position.update_pnl(exit_price);
        position.is_open = false;
        position.closed_at = Some(Utc::now());
        position.exit_trade_id = exit_trade_id;

        self.db.update_position(&position).await?;
        self.positions.remove(&position.key());

        let realized = position.unrealized_pnl;
        self.current_balance += realized;
        self.risk.update_daily_pnl(realized);

        info!(
            id = position.id,
            symbol = %position.symbol,
            exit = %exit_price,
            realized = %realized,
            "position closed"
        );
        Ok(realized)
    }

    /// Refreshes unrealized P&L for every open position with a known price.
    /// Stop/take-profit hits are logged here; acting on them is up to the
    /// caller.
    pub async fn update_position_prices(&mut self, prices: &HashMap<Symbol, Decimal>) {
        for position in self.positions.values_mut() {
            let Some(&price) = prices.get(&position.symbol) else {
                continue;
            };
            position.update_pnl(price);
            if let Some(reason) = position.should_close() {
                warn!(
                    id = position.id,
                    symbol = %position.symbol,
                    reason = reason.as_str(),
                    "position exit level hit"
                );
            }
            if let Err(err) = self.db.update_position(position).await {
                error!(id = position.id, error = %err, "failed to persist position update");
            }
        }
    }

    pub fn get_position(&self, exchange: &str, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(&format!("{}:{}", exchange, symbol.0))
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Positions whose stop-loss or take-profit has been hit.
    pub fn positions_to_close(&self) -> Vec<(Position, CloseReason)> {
        self.positions
            .values()
            .filter_map(|p| p.should_close().map(|reason| (p.clone(), reason)))
            .collect()
    }

    pub fn can_open_position(&self, position_value: Decimal) -> risk::Result<()> {
        self.risk
            .can_open_position(self.positions.len(), position_value)
    }

    pub fn calculate_position_size(
        &self,
        entry_price: Decimal,
        stop_loss: Option<Decimal>,
    ) -> Decimal {
        self.risk
            .calculate_position_size(self.current_balance, entry_price, stop_loss)
    }

    pub async fn portfolio_stats(&self) -> Result<PortfolioStats> {
        let unrealized: Decimal = self.positions.values().map(|p| p.unrealized_pnl).sum();
        let realized = self.db.sum_realized_pnl().await?;
        let closed_trades = self.db.count_closed_trades().await?;

        let total_value = self.current_balance + unrealized;
        let total_return_pct = if self.initial_balance > Decimal::ZERO {
            (total_value - self.initial_balance) / self.initial_balance * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        Ok(PortfolioStats {
            initial_balance: self.initial_balance,
            current_balance: self.current_balance,
            open_positions: self.positions.len(),
            closed_trades,
            unrealized_pnl: unrealized,
            realized_pnl: realized,
            total_value,
            total_return_pct,
        })
    }

    /// Realized P&L since UTC midnight.
    pub async fn daily_pnl(&self) -> Result<Decimal> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Ok(self.db.realized_pnl_since(midnight).await?)
    }

    pub fn reset_daily_limits(&mut self) {
        self.risk.reset_daily_pnl();
    }

    pub fn current_balance(&self) -> Decimal {
        self.current_balance
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_config::DatabaseSettings;
    use risk::RiskSettings;
    use rust_decimal_macros::dec;

    async fn manager() -> PortfolioManager {
        let db = database::connect(&DatabaseSettings {
            url: "sqlite::memory:".to_string(),
        })
        .await
        .unwrap();
        let risk = RiskManager::new(RiskSettings {
            max_position_size: dec!(10000),
            risk_per_trade: dec!(0.02),
            max_daily_loss: dec!(500),
            max_open_positions: 3,
            ..RiskSettings::default()
        });
        let mut manager = PortfolioManager::new(db, risk, dec!(10000));
        manager.initialize(dec!(10000)).await;
        manager
    }

    fn new_position(symbol: &str, entry: Decimal) -> NewPosition {
        NewPosition {
            exchange: "binance".to_string(),
            symbol: Symbol(symbol.to_string()),
            side: Side::Long,
            amount: dec!(1),
            entry_price: entry,
            stop_loss: Some(entry * dec!(0.98)),
            take_profit: Some(entry * dec!(1.04)),
            strategy_name: "ma_crossover".to_string(),
            is_paper_trade: true,
            entry_trade_id: None,
        }
    }

    #[tokio::test]
    async fn open_close_roundtrip_updates_balance() {
        let mut m = manager().await;
        let position = m.open_position(new_position("BTC/USDT", dec!(100))).await.unwrap();
        assert!(position.id > 0);
        assert_eq!(m.open_positions().len(), 1);

        let realized = m.close_position(position, dec!(110), None).await.unwrap();
        assert_eq!(realized, dec!(10));
        assert_eq!(m.current_balance(), dec!(10010));
        assert!(m.open_positions().is_empty());
        assert_eq!(m.risk().daily_pnl(), dec!(10));
    }

    #[tokio::test]
    async fn duplicate_open_position_rejected_by_storage() {
        let mut m = manager().await;
        m.open_position(new_position("BTC/USDT", dec!(100))).await.unwrap();
        assert!(
            m.open_position(new_position("BTC/USDT", dec!(101)))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn zero_amount_rejected() {
        let mut m = manager().await;
        let mut new = new_position("BTC/USDT", dec!(100));
        new.amount = Decimal::ZERO;
        assert!(matches!(
            m.open_position(new).await,
            Err(Error::InvalidPosition(_))
        ));
    }

    #[tokio::test]
    async fn price_updates_flag_stop_hits() {
        let mut m = manager().await;
        m.open_position(new_position("BTC/USDT", dec!(100))).await.unwrap();

        let mut prices = HashMap::new();
        prices.insert(Symbol("BTC/USDT".to_string()), dec!(97));
        m.update_position_prices(&prices).await;

        let to_close = m.positions_to_close();
        assert_eq!(to_close.len(), 1);
        assert_eq!(to_close[0].1, CloseReason::StopLoss);
    }

    #[tokio::test]
    async fn positions_survive_a_restart() {
        let db = database::connect(&DatabaseSettings {
            url: "sqlite::memory:".to_string(),
        })
        .await
        .unwrap();
        let risk_settings = RiskSettings::default();

        let mut first = PortfolioManager::new(
            db.clone(),
            RiskManager::new(risk_settings.clone()),
            dec!(10000),
        );
        first.initialize(dec!(10000)).await;
        first
            .open_position(new_position("ETH/USDT", dec!(2000)))
            .await
            .unwrap();

        let mut second =
            PortfolioManager::new(db, RiskManager::new(risk_settings), dec!(10000));
        second.initialize(dec!(10000)).await;
        assert_eq!(second.open_positions().len(), 1);
        assert!(
            second
                .get_position("binance", &Symbol("ETH/USDT".to_string()))
                .is_some()
        );
    }

    #[tokio::test]
    async fn stats_reflect_realized_and_unrealized() {
        let mut m = manager().await;
        let p = m.open_position(new_position("BTC/USDT", dec!(100))).await.unwrap();
        m.close_position(p, dec!(120), None).await.unwrap();

        let stats = m.portfolio_stats().await.unwrap();
        assert_eq!(stats.current_balance, dec!(10020));
        assert_eq!(stats.open_positions, 0);
        assert_eq!(stats.total_value, dec!(10020));
        assert_eq!(stats.total_return_pct, dec!(0.2));
    }
}
