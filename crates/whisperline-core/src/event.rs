use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use whisperline_api::events::{Event, EventKind};

pub type ListenerFault = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &Event) -> Result<(), ListenerFault>;
}

/// Maps event kind to an ordered list of async listeners. Dispatch awaits
/// each listener sequentially on the caller's task; a listener fault is
/// logged and must not reach its siblings or the dispatcher.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<HashMap<EventKind, Vec<Arc<dyn EventListener>>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(listener);
    }

    pub async fn dispatch(&self, event: &Event) {
        let listeners = {
            let guard = self.listeners.read().await;
            guard.get(&event.kind()).cloned().unwrap_or_default()
        };
        for listener in listeners {
            if let Err(fault) = listener.on_event(event).await {
                warn!(kind = ?event.kind(), %fault, "event listener failed");
            }
        }
    }
}
