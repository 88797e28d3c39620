use async_trait::async_trait;
use chrono::Utc;
use core_types::{Candle, OrderSide, Symbol, Ticker};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use app_config::ExchangeSettings;

use crate::Exchange;
use crate::error::{Error, Result};
use crate::types::{BinanceOrderResponse, BinanceTicker, OrderFill};

type HmacSha256 = Hmac<Sha256>;

/// Spot REST client for Binance (`/api/v3`).
pub struct BinanceClient {
    http_client: reqwest::Client,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl BinanceClient {
    pub fn new(settings: &ExchangeSettings) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            base_url: settings.rest_base_url.clone(),
        }
    }

    /// Generates an HMAC-SHA256 signature for a query string.
    fn sign(&self, query_string: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| Error::MissingField("api_secret"))?;
        mac.update(query_string.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Appends the timestamp and signature required by signed endpoints.
    fn create_signed_query(&self, params: &mut String) -> Result<()> {
        if !params.is_empty() {
            params.push('&');
        }
        params.push_str(&format!("timestamp={}", Utc::now().timestamp_millis()));
        let signature = self.sign(params)?;
        params.push_str(&format!("&signature={}", signature));
        Ok(())
    }

    /// Binance reports errors as a JSON object with `code` and `msg`.
    fn check_api_error(value: &Value) -> Result<()> {
        if let Some(code) = value.get("code").and_then(Value::as_i64) {
            if code != 0 {
                let msg = value
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(Error::ApiError { code, msg });
            }
        }
        Ok(())
    }

    async fn post_signed(&self, path: &str, mut params: String) -> Result<Value> {
        self.create_signed_query(&mut params)?;
        let url = format!("{}{}", self.base_url, path);

        let text = self
            .http_client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .body(params)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(Error::RequestFailed)?
            .text()
            .await
            .map_err(Error::RequestFailed)?;

        let value: Value = serde_json::from_str(&text).map_err(Error::DeserializationFailed)?;
        Self::check_api_error(&value)?;
        Ok(value)
    }

    fn order_fill_from_response(response: BinanceOrderResponse) -> OrderFill {
        let filled_amount = response
            .executed_qty
            .as_deref()
            .and_then(|q| q.parse::<Decimal>().ok())
            .filter(|q| *q > Decimal::ZERO);
        let cost = response
            .cummulative_quote_qty
            .as_deref()
            .and_then(|q| q.parse::<Decimal>().ok())
            .filter(|q| *q > Decimal::ZERO);

        // Average price and total fee come from the individual fills.
        let mut fee = Decimal::ZERO;
        let mut fee_currency = None;
        let mut fill_qty = Decimal::ZERO;
        let mut fill_quote = Decimal::ZERO;
        for fill in &response.fills {
            if let (Ok(price), Ok(qty)) = (fill.price.parse::<Decimal>(), fill.qty.parse::<Decimal>()) {
                fill_qty += qty;
                fill_quote += price * qty;
            }
            if let Ok(commission) = fill.commission.parse::<Decimal>() {
                fee += commission;
                fee_currency = Some(fill.commission_asset.clone());
            }
        }

        let price = if fill_qty > Decimal::ZERO {
            Some(fill_quote / fill_qty)
        } else {
            match (cost, filled_amount) {
                (Some(cost), Some(qty)) if qty > Decimal::ZERO => Some(cost / qty),
                _ => None,
            }
        };

        OrderFill {
            order_id: response.order_id.to_string(),
            price,
            filled_amount,
            cost,
            fee: (fee > Decimal::ZERO).then_some(fee),
            fee_currency,
        }
    }
}

/// Binance spot symbols have no separator: "BTC/USDT" -> "BTCUSDT".
fn api_symbol(symbol: &Symbol) -> String {
    symbol.0.replace('/', "")
}

/// Parses the raw kline array-of-arrays format.
fn parse_klines(value: &Value) -> Result<Vec<Candle>> {
    let rows = value.as_array().ok_or(Error::MissingField("klines"))?;
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let fields = row.as_array().ok_or(Error::MissingField("kline row"))?;
        let decimal_at = |i: usize| -> Decimal {
            fields
                .get(i)
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default()
        };
        candles.push(Candle {
            open_time: fields.first().and_then(Value::as_i64).unwrap_or_default(),
            open: decimal_at(1),
            high: decimal_at(2),
            low: decimal_at(3),
            close: decimal_at(4),
            volume: decimal_at(5),
            close_time: fields.get(6).and_then(Value::as_i64).unwrap_or_default(),
        });
    }
    Ok(candles)
}

#[async_trait]
impl Exchange for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    /// `GET /api/v3/klines`
    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            api_symbol(symbol),
            timeframe,
            limit
        );

        let text = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(Error::RequestFailed)?
            .text()
            .await
            .map_err(Error::RequestFailed)?;

        let value: Value = serde_json::from_str(&text).map_err(Error::DeserializationFailed)?;
        Self::check_api_error(&value)?;
        parse_klines(&value)
    }

    /// `GET /api/v3/ticker/24hr`
    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker> {
        let url = format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            self.base_url,
            api_symbol(symbol)
        );

        let text = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(Error::RequestFailed)?
            .text()
            .await
            .map_err(Error::RequestFailed)?;

        let value: Value = serde_json::from_str(&text).map_err(Error::DeserializationFailed)?;
        Self::check_api_error(&value)?;

        let ticker: BinanceTicker =
            serde_json::from_value(value).map_err(Error::DeserializationFailed)?;
        Ok(Ticker {
            last: ticker.last_price.parse().ok(),
            close: ticker.prev_close_price.as_deref().and_then(|p| p.parse().ok()),
            bid: ticker.bid_price.as_deref().and_then(|p| p.parse().ok()),
            ask: ticker.ask_price.as_deref().and_then(|p| p.parse().ok()),
        })
    }

    /// `POST /api/v3/order` with `type=MARKET`.
    async fn create_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<OrderFill> {
        let side_str = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}",
            api_symbol(symbol),
            side_str,
            amount.normalize()
        );

        debug!(symbol = %symbol, side = side_str, %amount, "placing market order");
        let value = self.post_signed("/api/v3/order", params).await?;
        let response: BinanceOrderResponse =
            serde_json::from_value(value).map_err(Error::DeserializationFailed)?;
        Ok(Self::order_fill_from_response(response))
    }

    /// `POST /api/v3/order` with `type=STOP_LOSS_LIMIT`. The limit price is
    /// set to the stop price; fine for a protective exit.
    async fn create_stop_loss_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
        stop_price: Decimal,
    ) -> Result<OrderFill> {
        let side_str = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let params = format!(
            "symbol={}&side={}&type=STOP_LOSS_LIMIT&timeInForce=GTC&quantity={}&price={}&stopPrice={}",
            api_symbol(symbol),
            side_str,
            amount.normalize(),
            stop_price.normalize(),
            stop_price.normalize()
        );

        debug!(symbol = %symbol, side = side_str, %stop_price, "placing stop-loss order");
        let value = self.post_signed("/api/v3/order", params).await?;
        let response: BinanceOrderResponse =
            serde_json::from_value(value).map_err(Error::DeserializationFailed)?;
        Ok(Self::order_fill_from_response(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn klines_parse_into_candles() {
        let raw = json!([
            [1700000000000i64, "50000.1", "50100.0", "49900.5", "50050.0", "12.5", 1700000059999i64, "x", 1, "y", "z", "0"],
            [1700000060000i64, "50050.0", "50200.0", "50000.0", "50150.0", "8.1", 1700000119999i64, "x", 1, "y", "z", "0"]
        ]);

        let candles = parse_klines(&raw).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, dec!(50000.1));
        assert_eq!(candles[0].close, dec!(50050.0));
        assert_eq!(candles[1].close_time, 1700000119999);
    }

    #[test]
    fn error_object_is_rejected() {
        let raw = json!({ "code": -1121, "msg": "Invalid symbol." });
        assert!(BinanceClient::check_api_error(&raw).is_err());
    }

    #[test]
    fn order_fill_averages_fills() {
        let response: BinanceOrderResponse = serde_json::from_value(json!({
            "orderId": 12345,
            "executedQty": "2.0",
            "cummulativeQuoteQty": "201.0",
            "fills": [
                { "price": "100.0", "qty": "1.0", "commission": "0.1", "commissionAsset": "USDT" },
                { "price": "101.0", "qty": "1.0", "commission": "0.1", "commissionAsset": "USDT" }
            ]
        }))
        .unwrap();

        let fill = BinanceClient::order_fill_from_response(response);
        assert_eq!(fill.order_id, "12345");
        assert_eq!(fill.price, Some(dec!(100.5)));
        assert_eq!(fill.filled_amount, Some(dec!(2.0)));
        assert_eq!(fill.fee, Some(dec!(0.2)));
        assert_eq!(fill.fee_currency.as_deref(), Some("USDT"));
    }

    #[test]
    fn order_fill_without_fills_uses_totals() {
        let response: BinanceOrderResponse = serde_json::from_value(json!({
            "orderId": 9,
            "executedQty": "4.0",
            "cummulativeQuoteQty": "400.0",
            "fills": []
        }))
        .unwrap();

        let fill = BinanceClient::order_fill_from_response(response);
        assert_eq!(fill.price, Some(dec!(100)));
        assert_eq!(fill.fee, None);
    }

    #[test]
    fn symbols_lose_their_separator() {
        assert_eq!(api_symbol(&Symbol("BTC/USDT".to_string())), "BTCUSDT");
    }
}
