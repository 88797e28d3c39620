use core_types::{Candle, Side, Signal, Symbol};
use num_traits::cast::ToPrimitive;
use rust_decimal::Decimal;
use ta::Next;
use ta::indicators::RelativeStrengthIndex as Rsi;

use crate::common::StrategyCommon;
use crate::types::RsiReversionSettings;

/// Mean reversion on RSI extremes. Buys when RSI crosses back up through the
/// oversold level, sells when it crosses back down through overbought.
#[derive(Debug)]
pub struct RsiReversion {
    pub common: StrategyCommon,
    settings: RsiReversionSettings,
}

impl RsiReversion {
    pub fn new(symbol: Symbol, timeframe: String, settings: RsiReversionSettings) -> Self {
        let min_data = settings.period * 2 + 2;
        Self {
            common: StrategyCommon::new(symbol, timeframe, min_data),
            settings,
        }
    }

    pub fn analyze(&mut self, candles: &[Candle]) -> Signal {
        if candles.len() < self.common.min_data_points {
            return Signal::Hold;
        }

        let Ok(mut rsi) = Rsi::new(self.settings.period) else {
            return Signal::Hold;
        };

        let mut prev = 50.0;
        let mut curr = 50.0;
        for candle in candles {
            let Some(close) = candle.close.to_f64() else {
                return Signal::Hold;
            };
            prev = curr;
            curr = rsi.next(close);
        }

        if prev <= self.settings.oversold && curr > self.settings.oversold {
            Signal::Buy
        } else if prev >= self.settings.overbought && curr < self.settings.overbought {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    pub fn entry_price(&self, candles: &[Candle]) -> Option<Decimal> {
        candles.last().map(|c| c.close)
    }

    pub fn stop_loss(&self, entry: Decimal, side: Side) -> Option<Decimal> {
        let pct = Decimal::new(15, 3); // 1.5%, tight stop for reversion trades
        Some(match side {
            Side::Long => entry * (Decimal::ONE - pct),
            Side::Short => entry * (Decimal::ONE + pct),
        })
    }

    pub fn take_profit(&self, entry: Decimal, side: Side) -> Option<Decimal> {
        let pct = Decimal::new(3, 2);
        Some(match side {
            Side::Long => entry * (Decimal::ONE + pct),
            Side::Short => entry * (Decimal::ONE - pct),
        })
    }
}
