//! Per-conversation event channels
//!
//! One broadcast broker per conversation with at least one live listener.
//! Brokers are created on first subscribe and dropped once they have been
//! without receivers for the idle grace period.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::config::ChatConfig;
use crate::data::ChatMessage;
use crate::metrics::{
    CHAT_CHANNELS_ACTIVE, CHAT_EVENTS_PUBLISHED_TOTAL, CHAT_SUBSCRIBER_CAP_EXCEEDED_TOTAL,
    CHAT_SUBSCRIBERS_ACTIVE,
};

/// Event delivered to conversation listeners
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Message { message: ChatMessage },
    Read { conversation_id: String, user_id: String },
    Completed { conversation_id: String },
}

impl ChatEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Read { .. } => "read",
            Self::Completed { .. } => "completed",
        }
    }
}

/// Registry of conversation brokers
pub struct ChatEventRegistry {
    channels: Mutex<HashMap<String, broadcast::Sender<ChatEvent>>>,
    max_subscribers: usize,
    capacity: usize,
    idle_grace: Duration,
}

impl ChatEventRegistry {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            max_subscribers: config.max_subscribers,
            capacity: config.channel_capacity.max(1),
            idle_grace: Duration::from_secs(config.idle_grace_seconds),
        }
    }

    /// Attach a listener, creating the conversation's broker if needed
    ///
    /// Past `max_subscribers` the subscribe still succeeds with a warning.
    pub fn subscribe(self: &Arc<Self>, conversation_id: &str) -> ChatSubscription {
        let receiver = {
            let mut channels = self.channels.lock();
            let sender = channels
                .entry(conversation_id.to_string())
                .or_insert_with(|| {
                    tracing::debug!(conversation_id = %conversation_id, "Created chat broker");
                    broadcast::channel(self.capacity).0
                });

            let current = sender.receiver_count();
            if current >= self.max_subscribers {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    subscribers = current + 1,
                    limit = self.max_subscribers,
                    "Chat subscriber limit exceeded"
                );
                CHAT_SUBSCRIBER_CAP_EXCEEDED_TOTAL.inc();
            }

            let receiver = sender.subscribe();
            CHAT_CHANNELS_ACTIVE.set(channels.len() as i64);
            receiver
        };
        CHAT_SUBSCRIBERS_ACTIVE.inc();

        ChatSubscription {
            receiver,
            _guard: SubscriptionGuard {
                registry: Arc::downgrade(self),
                conversation_id: conversation_id.to_string(),
            },
        }
    }

    /// Send an event to the conversation's broker
    ///
    /// # Returns
    /// Number of listeners reached; 0 when nobody is subscribed
    pub fn publish(&self, conversation_id: &str, event: ChatEvent) -> usize {
        let channels = self.channels.lock();
        match channels.get(conversation_id) {
            Some(sender) => {
                CHAT_EVENTS_PUBLISHED_TOTAL.inc();
                sender.send(event).unwrap_or(0)
            }
            None => 0,
        }
    }

    /// Number of live brokers
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Listeners currently attached to one conversation
    pub fn subscriber_count(&self, conversation_id: &str) -> usize {
        self.channels
            .lock()
            .get(conversation_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn remove_if_idle(&self, conversation_id: &str) -> bool {
        let mut channels = self.channels.lock();
        let idle = channels
            .get(conversation_id)
            .is_some_and(|sender| sender.receiver_count() == 0);

        if idle {
            channels.remove(conversation_id);
            CHAT_CHANNELS_ACTIVE.set(channels.len() as i64);
            tracing::debug!(conversation_id = %conversation_id, "Removed idle chat broker");
        }
        idle
    }
}

/// A live listener on one conversation
pub struct ChatSubscription {
    // Dropped before the guard so the receiver count is already updated
    // when the idle check runs.
    receiver: broadcast::Receiver<ChatEvent>,
    _guard: SubscriptionGuard,
}

impl ChatSubscription {
    /// Next event, or None once the broker is gone
    ///
    /// A listener that falls behind skips the overwritten events.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Chat listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ChatEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}

struct SubscriptionGuard {
    registry: Weak<ChatEventRegistry>,
    conversation_id: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        CHAT_SUBSCRIBERS_ACTIVE.dec();

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let conversation_id = std::mem::take(&mut self.conversation_id);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let grace = registry.idle_grace;
                let registry = Arc::downgrade(&registry);
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(registry) = registry.upgrade() {
                        registry.remove_if_idle(&conversation_id);
                    }
                });
            }
            Err(_) => {
                registry.remove_if_idle(&conversation_id);
            }
        }
    }
}
