use rust_decimal::Decimal;
use serde::Deserialize;

/// What came back from the exchange after an order was placed. Everything
/// except the order id is best-effort; callers fall back to ticker data for
/// anything missing.
#[derive(Debug, Clone, Default)]
pub struct OrderFill {
    pub order_id: String,
    pub price: Option<Decimal>,
    pub filled_amount: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub fee_currency: Option<String>,
}

/// One fill leg in a Binance order response.
#[derive(Debug, Deserialize)]
pub struct BinanceFill {
    pub price: String,
    pub qty: String,
    pub commission: String,
    #[serde(rename = "commissionAsset")]
    pub commission_asset: String,
}

#[derive(Debug, Deserialize)]
pub struct BinanceOrderResponse {
    #[serde(rename = "orderId")]
    pub order_id: i64,
    #[serde(rename = "executedQty", default)]
    pub executed_qty: Option<String>,
    #[serde(rename = "cummulativeQuoteQty", default)]
    pub cummulative_quote_qty: Option<String>,
    #[serde(default)]
    pub fills: Vec<BinanceFill>,
}

#[derive(Debug, Deserialize)]
pub struct BinanceTicker {
    #[serde(rename = "lastPrice")]
    pub last_price: String,
    #[serde(rename = "prevClosePrice", default)]
    pub prev_close_price: Option<String>,
    #[serde(rename = "bidPrice", default)]
    pub bid_price: Option<String>,
    #[serde(rename = "askPrice", default)]
    pub ask_price: Option<String>,
}
