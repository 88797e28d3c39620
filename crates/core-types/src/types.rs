use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// A trading pair symbol, e.g. "BTC/USDT".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// The quote currency of the pair ("USDT" for "BTC/USDT"), if the symbol
    /// carries a separator.
    pub fn quote_currency(&self) -> Option<&str> {
        self.0.split('/').nth(1)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The directional exposure of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(Side::Long),
            "short" => Ok(Side::Short),
            other => Err(Error::UnknownVariant {
                kind: "side",
                value: other.to_string(),
            }),
        }
    }
}

/// The direction of an order leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl FromStr for OrderSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(Error::UnknownVariant {
                kind: "order side",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

impl FromStr for OrderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            other => Err(Error::UnknownVariant {
                kind: "order type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
            TradeStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TradeStatus::Open),
            "closed" => Ok(TradeStatus::Closed),
            "cancelled" => Ok(TradeStatus::Cancelled),
            other => Err(Error::UnknownVariant {
                kind: "trade status",
                value: other.to_string(),
            }),
        }
    }
}

/// A strategy's recommended action for the next decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Buy,
    Sell,
    CloseLong,
    CloseShort,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::CloseLong => "close_long",
            Signal::CloseShort => "close_short",
            Signal::Hold => "hold",
        }
    }
}

/// A single OHLCV candle. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

/// A snapshot of the current market price for one symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ticker {
    pub last: Option<Decimal>,
    pub close: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl Ticker {
    /// The reference price: last traded price, falling back to the close.
    pub fn price(&self) -> Option<Decimal> {
        self.last.or(self.close)
    }
}

/// Why a position was flagged for closing by its own exit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TakeProfit => "take_profit",
        }
    }
}

/// An open or closed directional exposure to one symbol on one exchange.
///
/// While open, a position is uniquely addressed by (exchange, symbol). Once
/// `is_open` flips to false the position is immutable apart from the closing
/// bookkeeping fields (`closed_at`, `exit_trade_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub exchange: String,
    pub symbol: Symbol,
    pub side: Side,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub leverage: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub trailing_stop: Option<Decimal>,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,
    pub strategy_name: String,
    pub is_open: bool,
    pub is_paper_trade: bool,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub entry_trade_id: Option<i64>,
    pub exit_trade_id: Option<i64>,
}

impl Position {
    /// The in-memory map key for this position.
    pub fn key(&self) -> String {
        format!("{}:{}", self.exchange, self.symbol.0)
    }

    /// Mark-to-market P&L at `current_price`. Returns (value, percentage).
    pub fn calculate_pnl(&self) -> (Decimal, Decimal) {
        let entry_value = self.amount * self.entry_price;
        let current_value = self.amount * self.current_price;

        let pnl = match self.side {
            Side::Long => current_value - entry_value,
            Side::Short => entry_value - current_value,
        };

        let pct = if entry_value > Decimal::ZERO {
            pnl / entry_value * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        (pnl, pct)
    }

    /// Updates the current price and recomputes unrealized P&L. Idempotent for
    /// a given price.
    pub fn update_pnl(&mut self, current_price: Decimal) {
        self.current_price = current_price;
        let (pnl, pct) = self.calculate_pnl();
        self.unrealized_pnl = pnl;
        self.unrealized_pnl_pct = pct;
        self.updated_at = Utc::now();
    }

    /// Whether the position's stop-loss or take-profit has been hit at the
    /// current price. Detection only; acting on it is the caller's job.
    pub fn should_close(&self) -> Option<CloseReason> {
        if let Some(stop) = self.stop_loss {
            let hit = match self.side {
                Side::Long => self.current_price <= stop,
                Side::Short => self.current_price >= stop,
            };
            if hit {
                return Some(CloseReason::StopLoss);
            }
        }

        if let Some(target) = self.take_profit {
            let hit = match self.side {
                Side::Long => self.current_price >= target,
                Side::Short => self.current_price <= target,
            };
            if hit {
                return Some(CloseReason::TakeProfit);
            }
        }

        None
    }
}

/// An immutable record of one executed order leg.
///
/// `realized_pnl` stays zero for the opening leg and is stamped exactly once
/// when the leg closes a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub exchange: String,
    pub symbol: Symbol,
    pub order_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Decimal,
    pub cost: Decimal,
    pub fee: Decimal,
    pub fee_currency: Option<String>,
    pub position_side: Side,
    pub strategy_name: String,
    pub status: TradeStatus,
    pub is_paper_trade: bool,
    pub realized_pnl: Decimal,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}
