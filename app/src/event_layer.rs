use chrono::Utc;
use events::{EventBus, EventType};
use serde_json::json;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;

/// Forwards log records onto the event bus so subscribers see the bot's logs
/// alongside its trading events.
///
/// Must be installed behind an INFO-level filter: `EventBus::emit` itself
/// traces when there are no subscribers, and an unfiltered layer would loop
/// on that.
pub struct EventBridgeLayer {
    events: EventBus,
}

impl EventBridgeLayer {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }
}

impl<S> Layer<S> for EventBridgeLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = LogMessageVisitor::new();
        event.record(&mut visitor);

        self.events.emit(
            EventType::Log,
            json!({
                "timestamp": Utc::now(),
                "level": event.metadata().level().to_string(),
                "target": event.metadata().target(),
                "message": visitor.message,
            }),
        );
    }
}

/// Captures the `message` field of a log event.
struct LogMessageVisitor {
    message: String,
}

impl LogMessageVisitor {
    fn new() -> Self {
        Self {
            message: String::new(),
        }
    }
}

impl tracing::field::Visit for LogMessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}
