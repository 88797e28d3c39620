use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MaCrossoverSettings {
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,
}

fn default_fast_period() -> usize {
    9
}

fn default_slow_period() -> usize {
    21
}

impl Default for MaCrossoverSettings {
    fn default() -> Self {
        Self {
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsiReversionSettings {
    #[serde(default = "default_rsi_period")]
    pub period: usize,
    #[serde(default = "default_oversold")]
    pub oversold: f64,
    #[serde(default = "default_overbought")]
    pub overbought: f64,
}

fn default_rsi_period() -> usize {
    14
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

impl Default for RsiReversionSettings {
    fn default() -> Self {
        Self {
            period: default_rsi_period(),
            oversold: default_oversold(),
            overbought: default_overbought(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MomentumSettings {
    /// Bars used to find the recent high/low breakout levels.
    #[serde(default = "default_breakout_window")]
    pub breakout_window: usize,
    /// Bars used for the average-volume baseline.
    #[serde(default = "default_volume_window")]
    pub volume_window: usize,
    /// Current volume must exceed the baseline by this factor.
    #[serde(default = "default_volume_multiplier")]
    pub volume_multiplier: Decimal,
}

fn default_breakout_window() -> usize {
    20
}

fn default_volume_window() -> usize {
    20
}

fn default_volume_multiplier() -> Decimal {
    dec!(1.5)
}

impl Default for MomentumSettings {
    fn default() -> Self {
        Self {
            breakout_window: default_breakout_window(),
            volume_window: default_volume_window(),
            volume_multiplier: default_volume_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacdBollingerSettings {
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_bb_period")]
    pub bb_period: usize,
    #[serde(default = "default_bb_stddev")]
    pub bb_stddev: f64,
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_stddev() -> f64 {
    2.0
}

impl Default for MacdBollingerSettings {
    fn default() -> Self {
        Self {
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bb_period: default_bb_period(),
            bb_stddev: default_bb_stddev(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridSettings {
    #[serde(default = "default_grid_levels")]
    pub levels: usize,
    /// Bars of history used to establish the grid's price range.
    #[serde(default = "default_grid_lookback")]
    pub lookback: usize,
}

fn default_grid_levels() -> usize {
    10
}

fn default_grid_lookback() -> usize {
    100
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            levels: default_grid_levels(),
            lookback: default_grid_lookback(),
        }
    }
}
