use async_trait::async_trait;
use core_types::{Candle, Signal, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A second opinion on a proposed signal before it reaches execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Agree,
    Disagree,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    /// 0-100 confidence in the proposed signal.
    pub confidence: u8,
    pub verdict: Verdict,
    /// Suggested scaling of the position size, around 1.0.
    pub position_multiplier: Decimal,
    pub reasoning: Option<String>,
}

/// What the validator gets to see when asked about a signal.
pub struct ValidationRequest<'a> {
    pub symbol: &'a Symbol,
    pub timeframe: &'a str,
    pub strategy_name: &'a str,
    pub signal: Signal,
    pub candles: &'a [Candle],
}

#[async_trait]
pub trait SignalValidator: Send + Sync {
    async fn validate_signal(&self, req: ValidationRequest<'_>) -> anyhow::Result<Validation>;
}
