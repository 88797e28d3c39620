use async_trait::async_trait;
use core_types::{Candle, OrderSide, Symbol, Ticker};
use rust_decimal::Decimal;

pub mod binance;
pub mod error;
pub mod types;

pub use binance::BinanceClient;
pub use error::{Error, Result};
pub use types::OrderFill;

/// The market-data and order surface the rest of the bot sees. Implemented
/// by the real Binance client and by mocks in tests.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_ohlcv(&self, symbol: &Symbol, timeframe: &str, limit: u32)
    -> Result<Vec<Candle>>;

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker>;

    async fn create_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<OrderFill>;

    async fn create_stop_loss_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
        stop_price: Decimal,
    ) -> Result<OrderFill>;
}
