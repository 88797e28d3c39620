use core_types::{Candle, Side, Signal, Symbol};
use rust_decimal::Decimal;

use crate::common::StrategyCommon;
use crate::types::MomentumSettings;

/// Breakout momentum. Buys a close above recent resistance and sells a close
/// below recent support, but only on above-average volume.
#[derive(Debug)]
pub struct Momentum {
    pub common: StrategyCommon,
    settings: MomentumSettings,
}

impl Momentum {
    pub fn new(symbol: Symbol, timeframe: String, settings: MomentumSettings) -> Self {
        let min_data = settings.breakout_window.max(settings.volume_window) + 2;
        Self {
            common: StrategyCommon::new(symbol, timeframe, min_data),
            settings,
        }
    }

    pub fn analyze(&mut self, candles: &[Candle]) -> Signal {
        if candles.len() < self.common.min_data_points {
            return Signal::Hold;
        }

        let Some(last) = candles.last() else {
            return Signal::Hold;
        };

        // Breakout levels come from the window ending at the previous candle,
        // so the current candle can actually break them.
        let end = candles.len() - 1;
        let start = end.saturating_sub(self.settings.breakout_window);
        let window = &candles[start..end];

        let Some(resistance) = window.iter().map(|c| c.high).max() else {
            return Signal::Hold;
        };
        let Some(support) = window.iter().map(|c| c.low).min() else {
            return Signal::Hold;
        };

        let vol_start = end.saturating_sub(self.settings.volume_window);
        let vol_window = &candles[vol_start..end];
        let avg_volume = vol_window.iter().map(|c| c.volume).sum::<Decimal>()
            / Decimal::from(vol_window.len());

        let volume_confirmed = last.volume >= avg_volume * self.settings.volume_multiplier;
        if !volume_confirmed {
            return Signal::Hold;
        }

        if last.close > resistance {
            Signal::Buy
        } else if last.close < support {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    pub fn entry_price(&self, candles: &[Candle]) -> Option<Decimal> {
        candles.last().map(|c| c.close)
    }

    /// Stop below the breakout level: recent support for longs, resistance
    /// for shorts.
    pub fn stop_loss(&self, candles: &[Candle], entry: Decimal, side: Side) -> Option<Decimal> {
        let end = candles.len().checked_sub(1)?;
        let start = end.saturating_sub(self.settings.breakout_window);
        let window = &candles[start..end];
        match side {
            Side::Long => window.iter().map(|c| c.low).min().filter(|&s| s < entry),
            Side::Short => window.iter().map(|c| c.high).max().filter(|&s| s > entry),
        }
    }

    pub fn take_profit(&self, entry: Decimal, stop: Option<Decimal>, side: Side) -> Option<Decimal> {
        let stop = stop?;
        let risk = (entry - stop).abs();
        Some(match side {
            Side::Long => entry + risk * Decimal::TWO,
            Side::Short => entry - risk * Decimal::TWO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(low: Decimal, high: Decimal, close: Decimal, volume: Decimal, i: i64) -> Candle {
        Candle {
            open_time: i * 60_000,
            open: close,
            high,
            low,
            close,
            volume,
            close_time: (i + 1) * 60_000 - 1,
        }
    }

    fn strategy() -> Momentum {
        Momentum::new(
            Symbol("SOL/USDT".to_string()),
            "1h".to_string(),
            MomentumSettings {
                breakout_window: 10,
                volume_window: 10,
                volume_multiplier: dec!(1.5),
            },
        )
    }

    fn ranging(n: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| candle(dec!(95), dec!(105), dec!(100), dec!(100), i))
            .collect()
    }

    #[test]
    fn breakout_on_heavy_volume_fires_buy() {
        let mut candles = ranging(20);
        candles.push(candle(dec!(104), dec!(112), dec!(110), dec!(300), 20));
        assert_eq!(strategy().analyze(&candles), Signal::Buy);
    }

    #[test]
    fn breakdown_on_heavy_volume_fires_sell() {
        let mut candles = ranging(20);
        candles.push(candle(dec!(88), dec!(96), dec!(90), dec!(300), 20));
        assert_eq!(strategy().analyze(&candles), Signal::Sell);
    }

    #[test]
    fn breakout_without_volume_holds() {
        let mut candles = ranging(20);
        candles.push(candle(dec!(104), dec!(112), dec!(110), dec!(100), 20));
        assert_eq!(strategy().analyze(&candles), Signal::Hold);
    }

    #[test]
    fn inside_range_holds() {
        let mut candles = ranging(20);
        candles.push(candle(dec!(96), dec!(104), dec!(101), dec!(300), 20));
        assert_eq!(strategy().analyze(&candles), Signal::Hold);
    }

    #[test]
    fn stop_sits_at_range_support_for_long() {
        let mut candles = ranging(20);
        candles.push(candle(dec!(104), dec!(112), dec!(110), dec!(300), 20));
        let s = strategy();
        let stop = s.stop_loss(&candles, dec!(110), Side::Long);
        assert_eq!(stop, Some(dec!(95)));
        assert_eq!(s.take_profit(dec!(110), stop, Side::Long), Some(dec!(140)));
    }
}
