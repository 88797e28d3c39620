use std::sync::Arc;

use core_types::{Candle, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::Strategy;
use crate::validator::{SignalValidator, Validation, ValidationRequest, Verdict};

/// Wraps another strategy and runs its non-hold signals past an external
/// validator. Fails closed: a validator error turns the signal into a hold.
pub struct AiValidated {
    inner: Box<Strategy>,
    validator: Arc<dyn SignalValidator>,
    min_confidence: u8,
    pub last_validation: Option<Validation>,
    pub approvals: u32,
    pub rejections: u32,
}

impl AiValidated {
    pub fn new(inner: Strategy, validator: Arc<dyn SignalValidator>, min_confidence: u8) -> Self {
        Self {
            inner: Box::new(inner),
            validator,
            min_confidence,
            last_validation: None,
            approvals: 0,
            rejections: 0,
        }
    }

    pub fn inner(&self) -> &Strategy {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Strategy {
        &mut self.inner
    }

    pub async fn analyze(&mut self, candles: &[Candle]) -> Signal {
        let signal = Box::pin(self.inner.analyze(candles)).await;
        if signal == Signal::Hold {
            return signal;
        }

        let symbol = self.inner.symbol();
        let name = self.inner.name();
        let request = ValidationRequest {
            symbol: &symbol,
            timeframe: self.inner.timeframe(),
            strategy_name: &name,
            signal,
            candles,
        };

        match self.validator.validate_signal(request).await {
            Ok(validation) => {
                let approved = validation.verdict != Verdict::Disagree
                    && validation.confidence >= self.min_confidence;
                info!(
                    signal = signal.as_str(),
                    confidence = validation.confidence,
                    verdict = ?validation.verdict,
                    approved,
                    "signal validation"
                );
                self.last_validation = Some(validation);
                if approved {
                    self.approvals += 1;
                    signal
                } else {
                    self.rejections += 1;
                    Signal::Hold
                }
            }
            Err(err) => {
                warn!(error = %err, "signal validation failed, holding");
                self.rejections += 1;
                Signal::Hold
            }
        }
    }

    /// Position size scaling from the last validation, clamped to a sane
    /// band so a misbehaving validator cannot blow up sizing.
    pub fn position_multiplier(&self) -> Decimal {
        match &self.last_validation {
            Some(v) => v.position_multiplier.clamp(dec!(0.5), dec!(1.5)),
            None => Decimal::ONE,
        }
    }
}
