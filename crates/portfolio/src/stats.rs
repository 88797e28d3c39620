use rust_decimal::Decimal;
use serde::Serialize;

/// A point-in-time summary of the portfolio.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioStats {
    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub open_positions: usize,
    pub closed_trades: i64,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub total_value: Decimal,
    pub total_return_pct: Decimal,
}
