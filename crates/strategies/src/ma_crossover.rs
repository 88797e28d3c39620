use core_types::{Candle, Side, Signal, Symbol};
use num_traits::cast::ToPrimitive;
use rust_decimal::Decimal;
use ta::Next;
use ta::indicators::ExponentialMovingAverage as Ema;

use crate::common::StrategyCommon;
use crate::types::MaCrossoverSettings;

/// Dual EMA crossover. A buy fires when the fast EMA crosses above the slow
/// EMA, a sell when it crosses below.
#[derive(Debug)]
pub struct MaCrossover {
    pub common: StrategyCommon,
    settings: MaCrossoverSettings,
}

impl MaCrossover {
    pub fn new(symbol: Symbol, timeframe: String, settings: MaCrossoverSettings) -> Self {
        let min_data = settings.slow_period + 2;
        Self {
            common: StrategyCommon::new(symbol, timeframe, min_data),
            settings,
        }
    }

    pub fn analyze(&mut self, candles: &[Candle]) -> Signal {
        if candles.len() < self.common.min_data_points {
            return Signal::Hold;
        }

        let (Ok(mut fast), Ok(mut slow)) = (
            Ema::new(self.settings.fast_period),
            Ema::new(self.settings.slow_period),
        ) else {
            return Signal::Hold;
        };

        let mut prev_fast = 0.0;
        let mut prev_slow = 0.0;
        let mut curr_fast = 0.0;
        let mut curr_slow = 0.0;

        for candle in candles {
            let Some(close) = candle.close.to_f64() else {
                return Signal::Hold;
            };
            prev_fast = curr_fast;
            prev_slow = curr_slow;
            curr_fast = fast.next(close);
            curr_slow = slow.next(close);
        }

        if curr_fast > curr_slow && prev_fast <= prev_slow {
            Signal::Buy
        } else if curr_fast < curr_slow && prev_fast >= prev_slow {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    pub fn entry_price(&self, candles: &[Candle]) -> Option<Decimal> {
        candles.last().map(|c| c.close)
    }

    pub fn stop_loss(&self, entry: Decimal, side: Side) -> Option<Decimal> {
        let pct = Decimal::new(2, 2); // 2%
        Some(match side {
            Side::Long => entry * (Decimal::ONE - pct),
            Side::Short => entry * (Decimal::ONE + pct),
        })
    }

    pub fn take_profit(&self, entry: Decimal, side: Side) -> Option<Decimal> {
        let pct = Decimal::new(4, 2); // 4%
        Some(match side {
            Side::Long => entry * (Decimal::ONE + pct),
            Side::Short => entry * (Decimal::ONE - pct),
        })
    }
}
