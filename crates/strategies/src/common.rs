use chrono::{DateTime, Duration, Utc};
use core_types::{Signal, Symbol};
use tracing::{debug, warn};

/// State shared by every strategy variant: identity, signal history, and the
/// pre-execution signal filter.
#[derive(Debug, Clone)]
pub struct StrategyCommon {
    pub symbol: Symbol,
    pub timeframe: String,
    pub last_signal: Signal,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub signals_generated: u32,
    pub min_data_points: usize,
    pub cooldown: Duration,
}

impl StrategyCommon {
    pub fn new(symbol: Symbol, timeframe: String, min_data_points: usize) -> Self {
        Self {
            symbol,
            timeframe,
            last_signal: Signal::Hold,
            last_signal_at: None,
            signals_generated: 0,
            min_data_points,
            cooldown: Duration::minutes(5),
        }
    }

    /// Whether an actionable signal should be executed. Filters out holds,
    /// thin data, repeats of the previous signal, and signals inside the
    /// cooldown window.
    pub fn validate_signal(&self, signal: Signal, data_len: usize) -> bool {
        if signal == Signal::Hold {
            return false;
        }

        if data_len < self.min_data_points {
            warn!(
                symbol = %self.symbol,
                data_len,
                required = self.min_data_points,
                "signal rejected, not enough data"
            );
            return false;
        }

        if signal == self.last_signal {
            debug!(symbol = %self.symbol, signal = signal.as_str(), "duplicate signal suppressed");
            return false;
        }

        if let Some(at) = self.last_signal_at {
            if Utc::now() - at < self.cooldown {
                debug!(symbol = %self.symbol, "signal inside cooldown window");
                return false;
            }
        }

        true
    }

    /// Records an executed signal so the duplicate and cooldown filters see
    /// it next time.
    pub fn record_signal(&mut self, signal: Signal) {
        self.last_signal = signal;
        self.last_signal_at = Some(Utc::now());
        self.signals_generated += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common() -> StrategyCommon {
        StrategyCommon::new(Symbol("BTC/USDT".to_string()), "1h".to_string(), 50)
    }

    #[test]
    fn hold_never_validates() {
        let c = common();
        assert!(!c.validate_signal(Signal::Hold, 200));
    }

    #[test]
    fn thin_data_rejected() {
        let c = common();
        assert!(!c.validate_signal(Signal::Buy, 10));
        assert!(c.validate_signal(Signal::Buy, 200));
    }

    #[test]
    fn duplicate_signal_suppressed() {
        let mut c = common();
        c.record_signal(Signal::Buy);
        assert!(!c.validate_signal(Signal::Buy, 200));
    }

    #[test]
    fn cooldown_blocks_fresh_signal() {
        let mut c = common();
        c.record_signal(Signal::Buy);
        // Different signal, but still inside the cooldown.
        assert!(!c.validate_signal(Signal::Sell, 200));

        c.last_signal_at = Some(Utc::now() - Duration::minutes(10));
        assert!(c.validate_signal(Signal::Sell, 200));
    }
}
