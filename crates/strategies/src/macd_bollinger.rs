use core_types::{Candle, Side, Signal, Symbol};
use num_traits::cast::ToPrimitive;
use rust_decimal::Decimal;
use ta::Next;
use ta::indicators::{BollingerBands, MovingAverageConvergenceDivergence as Macd};

use crate::common::StrategyCommon;
use crate::types::MacdBollingerSettings;

/// MACD crossover confirmed by Bollinger band position. A bullish MACD cross
/// only buys when price sits in the lower half of the bands; a bearish cross
/// only sells in the upper half.
#[derive(Debug)]
pub struct MacdBollinger {
    pub common: StrategyCommon,
    settings: MacdBollingerSettings,
}

impl MacdBollinger {
    pub fn new(symbol: Symbol, timeframe: String, settings: MacdBollingerSettings) -> Self {
        let min_data = settings.macd_slow.max(settings.bb_period) + settings.macd_signal + 2;
        Self {
            common: StrategyCommon::new(symbol, timeframe, min_data),
            settings,
        }
    }

    pub fn analyze(&mut self, candles: &[Candle]) -> Signal {
        if candles.len() < self.common.min_data_points {
            return Signal::Hold;
        }

        let Ok(mut macd) = Macd::new(
            self.settings.macd_fast,
            self.settings.macd_slow,
            self.settings.macd_signal,
        ) else {
            return Signal::Hold;
        };
        let Ok(mut bands) = BollingerBands::new(self.settings.bb_period, self.settings.bb_stddev)
        else {
            return Signal::Hold;
        };

        let mut prev_hist = 0.0;
        let mut curr_hist = 0.0;
        let mut close = 0.0;
        let mut band = None;

        for candle in candles {
            let Some(c) = candle.close.to_f64() else {
                return Signal::Hold;
            };
            close = c;
            let out = macd.next(c);
            prev_hist = curr_hist;
            curr_hist = out.macd - out.signal;
            band = Some(bands.next(c));
        }

        let Some(band) = band else {
            return Signal::Hold;
        };

        let bullish_cross = curr_hist > 0.0 && prev_hist <= 0.0;
        let bearish_cross = curr_hist < 0.0 && prev_hist >= 0.0;

        if bullish_cross && close <= band.average {
            Signal::Buy
        } else if bearish_cross && close >= band.average {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    pub fn entry_price(&self, candles: &[Candle]) -> Option<Decimal> {
        candles.last().map(|c| c.close)
    }

    pub fn stop_loss(&self, entry: Decimal, side: Side) -> Option<Decimal> {
        let pct = Decimal::new(2, 2);
        Some(match side {
            Side::Long => entry * (Decimal::ONE - pct),
            Side::Short => entry * (Decimal::ONE + pct),
        })
    }

    pub fn take_profit(&self, entry: Decimal, side: Side) -> Option<Decimal> {
        let pct = Decimal::new(4, 2);
        Some(match side {
            Side::Long => entry * (Decimal::ONE + pct),
            Side::Short => entry * (Decimal::ONE - pct),
        })
    }
}
