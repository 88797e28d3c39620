use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Everything the bot announces to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SignalBuy,
    SignalSell,
    SignalClose,
    OrderCreated,
    OrderFilled,
    OrderCancelled,
    OrderFailed,
    PositionOpened,
    PositionClosed,
    PositionUpdated,
    RiskLimitHit,
    BotStarted,
    BotStopped,
    Error,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Fan-out bus for bot events. Cheap to clone; emitting with no subscribers
/// is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Builds and broadcasts an event, stamping the current time. Fire and
    /// forget.
    pub fn emit(&self, event_type: EventType, data: serde_json::Value) {
        let event = Event {
            event_type,
            data,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.tx.send(event) {
            // No subscribers. Must stay at trace level: the log-forwarding
            // layer in the app would otherwise loop through emit again.
            tracing::trace!("event dropped: {err}");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
