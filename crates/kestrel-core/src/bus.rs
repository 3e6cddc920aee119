use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("handler failed: {0}")]
    Handler(String),
}

/// A handler invoked for every event published on a subscribed topic.
/// Errors are logged and otherwise swallowed: one handler's failure must
/// never block delivery to its siblings or propagate back to the
/// publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, topic: &str, payload: &Value) -> Result<(), EventError>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), EventError>> + Send + 'static,
{
    async fn handle(&self, topic: &str, payload: &Value) -> Result<(), EventError> {
        (self)(topic.to_string(), payload.clone()).await
    }
}

struct Subscription {
    id: Uuid,
    handler: Arc<dyn EventHandler>,
}

/// Topic-keyed publish/subscribe bus. `publish` snapshots the subscriber
/// list under a read lock, drops the lock, then fans out concurrently
/// and awaits every handler before returning — so a handler may safely
/// call back into the bus (including publishing to the same topic)
/// without deadlocking on its own dispatch.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) -> Uuid {
        let id = Uuid::new_v4();
        let topic = topic.into();
        let mut table = self.subscriptions.write().await;
        table
            .entry(topic)
            .or_insert_with(Vec::new)
            .push(Subscription { id, handler });
        id
    }

    /// Idempotent: unsubscribing an id that isn't present (or a topic
    /// with no subscribers at all) is a silent no-op, not an error.
    pub async fn unsubscribe(&self, topic: &str, id: Uuid) {
        let mut table = self.subscriptions.write().await;
        let Some(subs) = table.get_mut(topic) else {
            return;
        };
        subs.retain(|s| s.id != id);
        if subs.is_empty() {
            table.remove(topic);
        }
    }

    /// Publish `payload` on `topic`. Completes once every subscribed
    /// handler has returned (or failed); handler failures are logged
    /// and do not affect the result.
    pub async fn publish(&self, topic: &str, payload: Value) {
        let snapshot: Vec<Arc<dyn EventHandler>> = {
            let table = self.subscriptions.read().await;
            match table.get(topic) {
                Some(subs) => subs.iter().map(|s| s.handler.clone()).collect(),
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            return;
        }

        let mut tasks = Vec::with_capacity(snapshot.len());
        for handler in snapshot {
            let topic = topic.to_string();
            let payload = payload.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = handler.handle(&topic, &payload).await {
                    tracing::error!(topic = %topic, error = %err, "event handler failed");
                }
            }));
        }

        for task in tasks {
            if let Err(join_err) = task.await {
                tracing::error!(error = %join_err, "event handler task panicked");
            }
        }
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _topic: &str, _payload: &Value) -> Result<(), EventError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_invokes_all_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("device.on", Arc::new(CountingHandler(count.clone())))
            .await;
        bus.subscribe("device.on", Arc::new(CountingHandler(count.clone())))
            .await;

        bus.publish("device.on", serde_json::json!({"id": 1})).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn publish_on_unknown_topic_is_a_noop() {
        let bus = EventBus::new();
        bus.publish("nothing.subscribed", serde_json::json!(null)).await;
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus
            .subscribe("device.off", Arc::new(CountingHandler(count.clone())))
            .await;

        bus.unsubscribe("device.off", id).await;
        bus.publish("device.off", serde_json::json!(null)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_id_is_a_silent_noop() {
        let bus = EventBus::new();
        bus.unsubscribe("device.off", Uuid::new_v4()).await;
        bus.unsubscribe("no.such.topic", Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_on_repeat_teardown() {
        let bus = EventBus::new();
        let id = bus
            .subscribe("device.off", Arc::new(CountingHandler(Arc::new(AtomicUsize::new(0)))))
            .await;

        bus.unsubscribe("device.off", id).await;
        bus.unsubscribe("device.off", id).await;
    }

    #[derive(Default)]
    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _topic: &str, _payload: &Value) -> Result<(), EventError> {
            Err(EventError::Handler("boom".into()))
        }
    }

    #[tokio::test]
    async fn one_failing_handler_does_not_block_siblings() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("device.on", Arc::new(FailingHandler)).await;
        bus.subscribe("device.on", Arc::new(CountingHandler(count.clone())))
            .await;

        bus.publish("device.on", serde_json::json!(null)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    struct ReentrantHandler {
        bus: Arc<EventBus>,
        fired: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for ReentrantHandler {
        async fn handle(&self, _topic: &str, _payload: &Value) -> Result<(), EventError> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            self.bus.publish("other.topic", serde_json::json!(null)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn handler_may_reenter_bus_without_deadlock() {
        let bus = Arc::new(EventBus::new());
        let fired = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "device.on",
            Arc::new(ReentrantHandler {
                bus: bus.clone(),
                fired: fired.clone(),
            }),
        )
        .await;

        bus.publish("device.on", serde_json::json!(null)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
