use core_types::{Candle, Signal, Symbol};
use rust_decimal::Decimal;
use tracing::debug;

use crate::common::StrategyCommon;
use crate::types::GridSettings;

/// Static price grid. Levels are spread evenly across the recent range; a
/// downward cross of a level below the base price buys, an upward cross of a
/// level above it sells.
#[derive(Debug)]
pub struct Grid {
    pub common: StrategyCommon,
    settings: GridSettings,
    buy_levels: Vec<Decimal>,
    sell_levels: Vec<Decimal>,
    last_price: Option<Decimal>,
}

impl Grid {
    pub fn new(symbol: Symbol, timeframe: String, settings: GridSettings) -> Self {
        let min_data = settings.lookback.min(50);
        Self {
            common: StrategyCommon::new(symbol, timeframe, min_data),
            settings,
            buy_levels: Vec::new(),
            sell_levels: Vec::new(),
            last_price: None,
        }
    }

    /// Rebuilds the grid from the lookback range, splitting levels into buy
    /// levels (below the base price) and sell levels (above it).
    fn build_grid(&mut self, candles: &[Candle]) {
        let start = candles.len().saturating_sub(self.settings.lookback);
        let window = &candles[start..];

        let (Some(low), Some(high)) = (
            window.iter().map(|c| c.low).min(),
            window.iter().map(|c| c.high).max(),
        ) else {
            return;
        };
        if high <= low || self.settings.levels < 2 {
            return;
        }

        let base = (low + high) / Decimal::TWO;
        let step = (high - low) / Decimal::from(self.settings.levels as u64);

        self.buy_levels.clear();
        self.sell_levels.clear();
        for i in 0..=self.settings.levels {
            let level = low + step * Decimal::from(i as u64);
            if level < base {
                self.buy_levels.push(level);
            } else if level > base {
                self.sell_levels.push(level);
            }
        }
        debug!(
            symbol = %self.common.symbol,
            buys = self.buy_levels.len(),
            sells = self.sell_levels.len(),
            "grid rebuilt"
        );
    }

    pub fn analyze(&mut self, candles: &[Candle]) -> Signal {
        if candles.len() < self.common.min_data_points {
            return Signal::Hold;
        }
        let Some(price) = candles.last().map(|c| c.close) else {
            return Signal::Hold;
        };

        if self.buy_levels.is_empty() && self.sell_levels.is_empty() {
            self.build_grid(candles);
        }

        let signal = match self.last_price {
            Some(last) => {
                let crossed_down = self
                    .buy_levels
                    .iter()
                    .any(|&level| last > level && price <= level);
                let crossed_up = self
                    .sell_levels
                    .iter()
                    .any(|&level| last < level && price >= level);
                if crossed_down {
                    Signal::Buy
                } else if crossed_up {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
            None => Signal::Hold,
        };

        self.last_price = Some(price);
        signal
    }

    /// Grid entries fill at the nearest level rather than the close.
    pub fn entry_price(&self, candles: &[Candle]) -> Option<Decimal> {
        let price = candles.last().map(|c| c.close)?;
        self.buy_levels
            .iter()
            .chain(self.sell_levels.iter())
            .min_by_key(|&&level| (level - price).abs())
            .copied()
            .or(Some(price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal, i: i64) -> Candle {
        Candle {
            open_time: i * 60_000,
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(100),
            close_time: (i + 1) * 60_000 - 1,
        }
    }

    fn strategy() -> Grid {
        Grid::new(
            Symbol("BNB/USDT".to_string()),
            "15m".to_string(),
            GridSettings {
                levels: 10,
                lookback: 50,
            },
        )
    }

    fn history() -> Vec<Candle> {
        // Range roughly 79..121 around a base of 100.
        (0..50)
            .map(|i| candle(dec!(100) + Decimal::from((i % 5) * 5 - 10), i))
            .collect()
    }

    #[test]
    fn crossing_down_through_buy_level_buys() {
        let mut s = strategy();
        let mut candles = history();
        assert_eq!(s.analyze(&candles), Signal::Hold);

        // Drop below a buy level in one step.
        candles.push(candle(dec!(85), 50));
        assert_eq!(s.analyze(&candles), Signal::Buy);
    }

    #[test]
    fn crossing_up_through_sell_level_sells() {
        let mut s = strategy();
        let mut candles = history();
        let _ = s.analyze(&candles);

        candles.push(candle(dec!(115), 50));
        assert_eq!(s.analyze(&candles), Signal::Sell);
    }

    #[test]
    fn drifting_between_levels_holds() {
        let mut s = strategy();
        let mut candles = history();
        let _ = s.analyze(&candles);

        let last = candles.last().map(|c| c.close).unwrap_or_default();
        candles.push(candle(last, 50));
        assert_eq!(s.analyze(&candles), Signal::Hold);
    }

    #[test]
    fn entry_snaps_to_nearest_level() {
        let mut s = strategy();
        let candles = history();
        let _ = s.analyze(&candles);

        let entry = s.entry_price(&candles);
        assert!(entry.is_some());
    }
}
