use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use core_types::{CloseReason, OrderSide, OrderType, Position, Side, Symbol, Trade, TradeStatus};
use database::Db;
use events::{EventBus, EventType};
use exchange_client::{Exchange, OrderFill};
use portfolio::{NewPosition, PortfolioManager};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Places orders (paper or live), records the trades, and keeps the
/// portfolio in sync.
///
/// The public entry points swallow errors: a failed order is logged, emitted
/// as an `OrderFailed` event, and reported as `None`. A single bad order must
/// not take down a trading pass.
pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    portfolio: PortfolioManager,
    db: Db,
    events: EventBus,
    paper_trading: bool,
    fee_rate: Decimal,
    exchange_name: String,
}

impl OrderExecutor {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        portfolio: PortfolioManager,
        db: Db,
        events: EventBus,
        paper_trading: bool,
        fee_rate: Decimal,
    ) -> Self {
        let exchange_name = exchange.name().to_string();
        Self {
            exchange,
            portfolio,
            db,
            events,
            paper_trading,
            fee_rate,
            exchange_name,
        }
    }

    pub fn portfolio(&self) -> &PortfolioManager {
        &self.portfolio
    }

    pub fn portfolio_mut(&mut self) -> &mut PortfolioManager {
        &mut self.portfolio
    }

    /// Buys `amount` of `symbol` at market and opens a long position.
    pub async fn execute_market_buy(
        &mut self,
        symbol: &Symbol,
        amount: Decimal,
        strategy_name: &str,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Option<Trade> {
        let result = self
            .try_market_buy(symbol, amount, strategy_name, stop_loss, take_profit)
            .await;
        self.unwrap_order_result(result, symbol, "buy")
    }

    /// Sells `amount` of `symbol` at market, closing an open long position
    /// on the symbol if there is one.
    pub async fn execute_market_sell(
        &mut self,
        symbol: &Symbol,
        amount: Decimal,
        strategy_name: &str,
    ) -> Option<Trade> {
        let result = self.try_market_sell(symbol, amount, strategy_name).await;
        self.unwrap_order_result(result, symbol, "sell")
    }

    /// Closes `position` at market because an exit rule fired.
    pub async fn close_position(
        &mut self,
        position: &Position,
        reason: CloseReason,
    ) -> Option<Trade> {
        info!(
            id = position.id,
            symbol = %position.symbol,
            reason = reason.as_str(),
            "closing position"
        );
        let trade = self
            .execute_market_sell(&position.symbol, position.amount, &position.strategy_name)
            .await?;

        self.events.emit(
            EventType::PositionClosed,
            json!({
                "position_id": position.id,
                "symbol": position.symbol,
                "reason": reason.as_str(),
                "realized_pnl": trade.realized_pnl,
            }),
        );
        Some(trade)
    }

    fn unwrap_order_result(
        &self,
        result: Result<Trade>,
        symbol: &Symbol,
        side: &str,
    ) -> Option<Trade> {
        match result {
            Ok(trade) => Some(trade),
            Err(err) => {
                error!(symbol = %symbol, side, error = %err, "order failed");
                self.events.emit(
                    EventType::OrderFailed,
                    json!({
                        "symbol": symbol,
                        "side": side,
                        "error": err.to_string(),
                    }),
                );
                None
            }
        }
    }

    async fn try_market_buy(
        &mut self,
        symbol: &Symbol,
        amount: Decimal,
        strategy_name: &str,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Trade> {
        let mut trade = if self.paper_trading {
            self.paper_fill(symbol, OrderSide::Buy, amount, strategy_name)
                .await?
        } else {
            self.live_fill(symbol, OrderSide::Buy, amount, strategy_name)
                .await?
        };
        trade.position_side = Side::Long;

        trade.id = self.db.insert_trade(&trade).await?;
        self.emit_filled(&trade);

        let position = self
            .portfolio
            .open_position(NewPosition {
                exchange: self.exchange_name.clone(),
                symbol: symbol.clone(),
                side: Side::Long,
                amount: trade.amount,
                entry_price: trade.price,
                stop_loss,
                take_profit,
                strategy_name: strategy_name.to_string(),
                is_paper_trade: self.paper_trading,
                entry_trade_id: Some(trade.id),
            })
            .await?;

        self.events.emit(
            EventType::PositionOpened,
            json!({
                "position_id": position.id,
                "symbol": symbol,
                "amount": position.amount,
                "entry_price": position.entry_price,
                "stop_loss": position.stop_loss,
                "take_profit": position.take_profit,
            }),
        );

        // Protective stop on the exchange is best-effort for live trading;
        // the position monitor is the backstop either way.
        if !self.paper_trading {
            if let Some(stop) = stop_loss {
                if let Err(err) = self
                    .exchange
                    .create_stop_loss_order(symbol, OrderSide::Sell, trade.amount, stop)
                    .await
                {
                    warn!(symbol = %symbol, error = %err, "failed to place stop-loss order");
                }
            }
        }

        Ok(trade)
    }

    async fn try_market_sell(
        &mut self,
        symbol: &Symbol,
        amount: Decimal,
        strategy_name: &str,
    ) -> Result<Trade> {
        let existing = self
            .portfolio
            .get_position(&self.exchange_name, symbol)
            .cloned();

        let mut trade = if self.paper_trading {
            self.paper_fill(symbol, OrderSide::Sell, amount, strategy_name)
                .await?
        } else {
            self.live_fill(symbol, OrderSide::Sell, amount, strategy_name)
                .await?
        };

        match &existing {
            Some(position) => trade.position_side = position.side,
            None => trade.position_side = Side::Short,
        }
        trade.status = TradeStatus::Closed;

        trade.id = self.db.insert_trade(&trade).await?;
        self.emit_filled(&trade);

        // A sell with no matching position keeps zero realized P&L.
        if let Some(position) = existing {
            let realized = self
                .portfolio
                .close_position(position, trade.price, Some(trade.id))
                .await?;
            trade.realized_pnl = realized;
            trade.closed_at = Some(Utc::now());
            self.db
                .mark_trade_closed(trade.id, realized, Utc::now())
                .await?;
        }

        Ok(trade)
    }

    /// Simulated fill at the current ticker price, charging the configured
    /// fee rate on the notional.
    async fn paper_fill(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
        strategy_name: &str,
    ) -> Result<Trade> {
        let ticker = self.exchange.fetch_ticker(symbol).await?;
        let price = ticker
            .price()
            .ok_or_else(|| Error::PriceUnavailable(symbol.0.clone()))?;

        let cost = amount * price;
        let fee = cost * self.fee_rate;
        let now = Utc::now();

        // Synthetic order id; the sequence suffix keeps ids unique even when
        // two orders land in the same microsecond.
        static PAPER_SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = PAPER_SEQ.fetch_add(1, Ordering::Relaxed);

        Ok(Trade {
            id: 0,
            exchange: self.exchange_name.clone(),
            symbol: symbol.clone(),
            order_id: format!("paper-{}-{}", now.timestamp_micros(), seq),
            side,
            order_type: OrderType::Market,
            amount,
            price,
            cost,
            fee,
            fee_currency: symbol.quote_currency().map(str::to_string),
            position_side: Side::Long,
            strategy_name: strategy_name.to_string(),
            status: TradeStatus::Open,
            is_paper_trade: true,
            realized_pnl: Decimal::ZERO,
            created_at: now,
            executed_at: Some(now),
            closed_at: None,
        })
    }

    /// Real order on the exchange. Missing fill details fall back to the
    /// ticker price and the configured fee rate.
    async fn live_fill(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
        strategy_name: &str,
    ) -> Result<Trade> {
        let order = self.exchange.create_market_order(symbol, side, amount).await?;
        let filled = order.filled_amount.unwrap_or(amount);
        let price = self.resolve_fill_price(symbol, &order, filled).await?;
        let cost = order.cost.unwrap_or(filled * price);
        let fee = order.fee.unwrap_or(cost * self.fee_rate);
        let now = Utc::now();

        Ok(Trade {
            id: 0,
            exchange: self.exchange_name.clone(),
            symbol: symbol.clone(),
            order_id: order.order_id,
            side,
            order_type: OrderType::Market,
            amount: filled,
            price,
            cost,
            fee,
            fee_currency: order
                .fee_currency
                .or_else(|| symbol.quote_currency().map(str::to_string)),
            position_side: Side::Long,
            strategy_name: strategy_name.to_string(),
            status: TradeStatus::Open,
            is_paper_trade: false,
            realized_pnl: Decimal::ZERO,
            created_at: now,
            executed_at: Some(now),
            closed_at: None,
        })
    }

    async fn resolve_fill_price(
        &self,
        symbol: &Symbol,
        order: &OrderFill,
        filled: Decimal,
    ) -> Result<Decimal> {
        if let Some(price) = order.price {
            return Ok(price);
        }
        if let Some(cost) = order.cost {
            if filled > Decimal::ZERO {
                return Ok(cost / filled);
            }
        }
        let ticker = self.exchange.fetch_ticker(symbol).await?;
        ticker
            .price()
            .ok_or_else(|| Error::PriceUnavailable(symbol.0.clone()))
    }

    fn emit_filled(&self, trade: &Trade) {
        self.events.emit(
            EventType::OrderFilled,
            json!({
                "trade_id": trade.id,
                "order_id": trade.order_id,
                "symbol": trade.symbol,
                "side": trade.side.as_str(),
                "amount": trade.amount,
                "price": trade.price,
                "cost": trade.cost,
                "fee": trade.fee,
                "paper": trade.is_paper_trade,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_config::DatabaseSettings;
    use async_trait::async_trait;
    use core_types::{Candle, Ticker};
    use risk::{RiskManager, RiskSettings};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct MockExchange {
        price: Mutex<Decimal>,
    }

    impl MockExchange {
        fn new(price: Decimal) -> Self {
            Self {
                price: Mutex::new(price),
            }
        }

        fn set_price(&self, price: Decimal) {
            *self.price.lock().unwrap() = price;
        }
    }

    #[async_trait]
    impl Exchange for MockExchange {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_ohlcv(
            &self,
            _symbol: &Symbol,
            _timeframe: &str,
            _limit: u32,
        ) -> exchange_client::Result<Vec<Candle>> {
            Ok(Vec::new())
        }

        async fn fetch_ticker(&self, _symbol: &Symbol) -> exchange_client::Result<Ticker> {
            Ok(Ticker {
                last: Some(*self.price.lock().unwrap()),
                close: None,
                bid: None,
                ask: None,
            })
        }

        async fn create_market_order(
            &self,
            _symbol: &Symbol,
            _side: OrderSide,
            _amount: Decimal,
        ) -> exchange_client::Result<OrderFill> {
            Err(exchange_client::Error::MissingField("not used in tests"))
        }

        async fn create_stop_loss_order(
            &self,
            _symbol: &Symbol,
            _side: OrderSide,
            _amount: Decimal,
            _stop_price: Decimal,
        ) -> exchange_client::Result<OrderFill> {
            Err(exchange_client::Error::MissingField("not used in tests"))
        }
    }

    async fn executor(price: Decimal) -> (OrderExecutor, Arc<MockExchange>, EventBus) {
        let db = database::connect(&DatabaseSettings {
            url: "sqlite::memory:".to_string(),
        })
        .await
        .unwrap();
        let exchange = Arc::new(MockExchange::new(price));
        let mut portfolio = PortfolioManager::new(
            db.clone(),
            RiskManager::new(RiskSettings::default()),
            dec!(10000),
        );
        portfolio.initialize(dec!(10000)).await;
        let events = EventBus::default();
        let executor = OrderExecutor::new(
            exchange.clone(),
            portfolio,
            db,
            events.clone(),
            true,
            dec!(0.001),
        );
        (executor, exchange, events)
    }

    #[tokio::test]
    async fn paper_buy_opens_position_and_charges_fee() {
        let (mut ex, _, events) = executor(dec!(100)).await;
        let mut rx = events.subscribe();
        let symbol = Symbol("BTC/USDT".to_string());

        let trade = ex
            .execute_market_buy(&symbol, dec!(2), "ma_crossover", Some(dec!(98)), None)
            .await
            .unwrap();

        assert!(trade.order_id.starts_with("paper-"));
        assert_eq!(trade.price, dec!(100));
        assert_eq!(trade.cost, dec!(200));
        assert_eq!(trade.fee, dec!(0.2));
        assert_eq!(trade.fee_currency.as_deref(), Some("USDT"));
        assert!(ex.portfolio().get_position("mock", &symbol).is_some());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type, EventType::OrderFilled);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_type, EventType::PositionOpened);
    }

    #[tokio::test]
    async fn paper_sell_closes_position_with_pnl() {
        let (mut ex, exchange, _) = executor(dec!(100)).await;
        let symbol = Symbol("BTC/USDT".to_string());

        ex.execute_market_buy(&symbol, dec!(2), "ma_crossover", None, None)
            .await
            .unwrap();

        exchange.set_price(dec!(110));
        let trade = ex
            .execute_market_sell(&symbol, dec!(2), "ma_crossover")
            .await
            .unwrap();

        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.realized_pnl, dec!(20));
        assert!(ex.portfolio().get_position("mock", &symbol).is_none());
        assert_eq!(ex.portfolio().current_balance(), dec!(10020));

        let stored = ex.db.get_trade(trade.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TradeStatus::Closed);
        assert_eq!(stored.realized_pnl, dec!(20));
    }

    #[tokio::test]
    async fn sell_without_position_keeps_zero_pnl() {
        let (mut ex, _, _) = executor(dec!(100)).await;
        let symbol = Symbol("ETH/USDT".to_string());

        let trade = ex
            .execute_market_sell(&symbol, dec!(1), "momentum")
            .await
            .unwrap();

        assert_eq!(trade.realized_pnl, Decimal::ZERO);
        assert_eq!(trade.position_side, Side::Short);
    }

    #[tokio::test]
    async fn close_position_emits_event_with_reason() {
        let (mut ex, exchange, events) = executor(dec!(100)).await;
        let symbol = Symbol("BTC/USDT".to_string());

        ex.execute_market_buy(&symbol, dec!(1), "ma_crossover", Some(dec!(98)), None)
            .await
            .unwrap();
        exchange.set_price(dec!(97));

        let mut rx = events.subscribe();
        let position = ex
            .portfolio()
            .get_position("mock", &symbol)
            .cloned()
            .unwrap();
        let trade = ex.close_position(&position, CloseReason::StopLoss).await.unwrap();
        assert_eq!(trade.realized_pnl, dec!(-3));

        let mut saw_close = false;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == EventType::PositionClosed {
                assert_eq!(event.data["reason"], "stop_loss");
                saw_close = true;
            }
        }
        assert!(saw_close);
    }

    #[tokio::test]
    async fn failed_order_returns_none_and_emits() {
        let (mut ex, _, events) = executor(dec!(100)).await;
        // Live mode makes the mock's order path fail.
        ex.paper_trading = false;
        let mut rx = events.subscribe();

        let result = ex
            .execute_market_buy(&Symbol("BTC/USDT".to_string()), dec!(1), "grid", None, None)
            .await;
        assert!(result.is_none());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::OrderFailed);
    }
}
