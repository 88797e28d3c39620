pub mod ai_validated;
pub mod common;
pub mod grid;
pub mod ma_crossover;
pub mod macd_bollinger;
pub mod momentum;
pub mod rsi_reversion;
pub mod types;
pub mod validator;

use core_types::{Candle, Side, Signal, Symbol};
use rust_decimal::Decimal;

pub use ai_validated::AiValidated;
pub use common::StrategyCommon;
pub use grid::Grid;
pub use ma_crossover::MaCrossover;
pub use macd_bollinger::MacdBollinger;
pub use momentum::Momentum;
pub use rsi_reversion::RsiReversion;
pub use validator::{SignalValidator, Validation, ValidationRequest, Verdict};

/// The closed set of strategies the bot can run.
///
/// A strategy is stateful: it remembers its last signal and cooldown, and the
/// grid variant carries its level state between calls. `AiValidated` wraps any
/// other variant and gates its signals through an external validator.
pub enum Strategy {
    MaCrossover(MaCrossover),
    RsiReversion(RsiReversion),
    Momentum(Momentum),
    MacdBollinger(MacdBollinger),
    Grid(Grid),
    AiValidated(AiValidated),
}

impl Strategy {
    fn common(&self) -> &StrategyCommon {
        match self {
            Strategy::MaCrossover(s) => &s.common,
            Strategy::RsiReversion(s) => &s.common,
            Strategy::Momentum(s) => &s.common,
            Strategy::MacdBollinger(s) => &s.common,
            Strategy::Grid(s) => &s.common,
            Strategy::AiValidated(s) => s.inner().common(),
        }
    }

    fn common_mut(&mut self) -> &mut StrategyCommon {
        match self {
            Strategy::MaCrossover(s) => &mut s.common,
            Strategy::RsiReversion(s) => &mut s.common,
            Strategy::Momentum(s) => &mut s.common,
            Strategy::MacdBollinger(s) => &mut s.common,
            Strategy::Grid(s) => &mut s.common,
            Strategy::AiValidated(s) => s.inner_mut().common_mut(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Strategy::MaCrossover(_) => "ma_crossover".to_string(),
            Strategy::RsiReversion(_) => "rsi_reversion".to_string(),
            Strategy::Momentum(_) => "momentum".to_string(),
            Strategy::MacdBollinger(_) => "macd_bollinger".to_string(),
            Strategy::Grid(_) => "grid".to_string(),
            Strategy::AiValidated(s) => format!("{}+ai", s.inner().name()),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.common().symbol.clone()
    }

    pub fn timeframe(&self) -> &str {
        &self.common().timeframe
    }

    pub async fn analyze(&mut self, candles: &[Candle]) -> Signal {
        match self {
            Strategy::MaCrossover(s) => s.analyze(candles),
            Strategy::RsiReversion(s) => s.analyze(candles),
            Strategy::Momentum(s) => s.analyze(candles),
            Strategy::MacdBollinger(s) => s.analyze(candles),
            Strategy::Grid(s) => s.analyze(candles),
            Strategy::AiValidated(s) => s.analyze(candles).await,
        }
    }

    pub fn entry_price(&self, candles: &[Candle]) -> Option<Decimal> {
        match self {
            Strategy::MaCrossover(s) => s.entry_price(candles),
            Strategy::RsiReversion(s) => s.entry_price(candles),
            Strategy::Momentum(s) => s.entry_price(candles),
            Strategy::MacdBollinger(s) => s.entry_price(candles),
            Strategy::Grid(s) => s.entry_price(candles),
            Strategy::AiValidated(s) => s.inner().entry_price(candles),
        }
    }

    pub fn stop_loss(&self, candles: &[Candle], entry: Decimal, side: Side) -> Option<Decimal> {
        match self {
            Strategy::MaCrossover(s) => s.stop_loss(entry, side),
            Strategy::RsiReversion(s) => s.stop_loss(entry, side),
            Strategy::Momentum(s) => s.stop_loss(candles, entry, side),
            Strategy::MacdBollinger(s) => s.stop_loss(entry, side),
            Strategy::Grid(_) => None,
            Strategy::AiValidated(s) => s.inner().stop_loss(candles, entry, side),
        }
    }

    pub fn take_profit(
        &self,
        entry: Decimal,
        stop: Option<Decimal>,
        side: Side,
    ) -> Option<Decimal> {
        match self {
            Strategy::MaCrossover(s) => s.take_profit(entry, side),
            Strategy::RsiReversion(s) => s.take_profit(entry, side),
            Strategy::Momentum(s) => s.take_profit(entry, stop, side),
            Strategy::MacdBollinger(s) => s.take_profit(entry, side),
            Strategy::Grid(_) => None,
            Strategy::AiValidated(s) => s.inner().take_profit(entry, stop, side),
        }
    }

    /// Whether a produced signal should actually be executed.
    pub fn validate_signal(&self, signal: Signal, data_len: usize) -> bool {
        self.common().validate_signal(signal, data_len)
    }

    pub fn record_signal(&mut self, signal: Signal) {
        self.common_mut().record_signal(signal);
    }

    /// Scaling applied to the calculated position size. Only the validated
    /// wrapper deviates from 1.
    pub fn position_multiplier(&self) -> Decimal {
        match self {
            Strategy::AiValidated(s) => s.position_multiplier(),
            _ => Decimal::ONE,
        }
    }
}
