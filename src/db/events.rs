//! Pool lifecycle events and the subscriber that logs them.

use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::correlation::CorrelationId;
use crate::logging::{into_fields, Level, LogRecord, Logger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolEventKind {
    Connected,
    Errored,
}

/// Something that happened to the pool's connectivity.
///
/// Events raised while servicing a request carry that request's correlation
/// id so the logged record can be tied back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolLifecycleEvent {
    pub kind: PoolEventKind,
    pub detail: String,
    pub correlation_id: Option<String>,
}

/// Broadcast stream of pool lifecycle events.
///
/// Publishing never blocks and never fails; with no subscribers the event is
/// simply dropped.
#[derive(Debug, Clone)]
pub struct PoolEvents {
    tx: broadcast::Sender<PoolLifecycleEvent>,
}

impl PoolEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(
        &self,
        kind: PoolEventKind,
        detail: impl Into<String>,
        correlation_id: Option<&CorrelationId>,
    ) {
        let _ = self.tx.send(PoolLifecycleEvent {
            kind,
            detail: detail.into(),
            correlation_id: correlation_id.map(|id| id.as_str().to_string()),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolLifecycleEvent> {
        self.tx.subscribe()
    }
}

/// Log every pool event until the stream closes.
pub fn spawn_pool_event_logger(
    mut rx: broadcast::Receiver<PoolLifecycleEvent>,
    logger: Logger,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&logger, &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    logger.log(
                        Level::Warn,
                        "Pool event logger fell behind",
                        json!({ "skipped": skipped }),
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(logger: &Logger, event: &PoolLifecycleEvent) {
    let (level, message) = match event.kind {
        PoolEventKind::Connected => (Level::Info, "Database connection established"),
        PoolEventKind::Errored => (Level::Error, "Database pool error"),
    };
    if !logger.enabled(level) {
        return;
    }

    let record = LogRecord::new(level, message, into_fields(json!({ "detail": event.detail })));
    match &event.correlation_id {
        Some(id) => logger.emit(record.with_correlation_id(id.clone())),
        None => logger.emit(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;

    #[tokio::test]
    async fn test_events_are_logged_in_order() {
        let sink = MemorySink::new();
        let logger = Logger::new(Level::Debug, sink.clone());
        let events = PoolEvents::new(8);
        let handle = spawn_pool_event_logger(events.subscribe(), logger);

        let id = CorrelationId::generate();
        events.publish(PoolEventKind::Connected, "first", None);
        events.publish(PoolEventKind::Errored, "connection reset", Some(&id));
        drop(events);
        handle.await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::Info);
        assert_eq!(records[0].field("detail").unwrap(), "first");
        assert_eq!(records[1].level, Level::Error);
        assert_eq!(records[1].message, "Database pool error");
        assert_eq!(records[0].correlation_id, None);
        assert_eq!(records[1].correlation_id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let events = PoolEvents::new(1);
        events.publish(PoolEventKind::Connected, "nobody listening", None);
    }
}
