use crate::error::Error;
use crate::messaging::event::{EventMessage, EventType};
use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Callback function type for event handling
pub type EventCallback = Arc<dyn Fn(EventMessage) -> Result<()> + Send + Sync>;

/// In-process event bus. Every subscriber sees each event published after it
/// subscribed; a subscriber that falls more than `capacity` events behind
/// skips the oldest ones.
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
    subscriptions: RwLock<HashMap<String, JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub async fn publish<T: Serialize + Send>(
        &self,
        event_type: EventType,
        source_id: Option<Uuid>,
        payload: T,
    ) -> Result<()> {
        let event = EventMessage::new(event_type, source_id, payload)
            .map_err(|e| Error::Serialization(format!("Failed to encode event: {}", e)))?;

        let routing_key = event.routing_key();
        let id = event.id;

        match self.sender.send(event) {
            Ok(receivers) => debug!(
                "Published event {} with routing key {} to {} subscribers",
                id, routing_key, receivers
            ),
            Err(_) => debug!("Published event {} with no subscribers", routing_key),
        }

        Ok(())
    }

    /// Publish and log instead of failing; used on paths that must not error
    pub async fn emit<T: Serialize + Send>(
        &self,
        event_type: EventType,
        source_id: Option<Uuid>,
        payload: T,
    ) {
        let label = event_type.to_string();
        if let Err(e) = self.publish(event_type, source_id, payload).await {
            warn!("Failed to publish {} event: {}", label, e);
        }
    }

    /// Raw stream of every event
    pub fn receiver(&self) -> broadcast::Receiver<EventMessage> {
        self.sender.subscribe()
    }

    /// Run `callback` for each event of `event_type` on a background task
    pub async fn subscribe(&self, event_type: EventType, callback: EventCallback) -> Result<String> {
        let mut receiver = self.sender.subscribe();
        let subscription_id = Uuid::new_v4().to_string();
        let subscription_id_clone = subscription_id.clone();

        let handle = tokio::spawn(async move {
            info!(
                "Started consumer for {} (subscription: {})",
                event_type, subscription_id_clone
            );

            loop {
                match receiver.recv().await {
                    Ok(event) if event.event_type == event_type => {
                        if let Err(e) = callback(event) {
                            error!("Error processing event: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "Subscription {} lagged, skipped {} events",
                            subscription_id_clone, skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            info!("Consumer stopped (subscription: {})", subscription_id_clone);
        });

        self.subscriptions
            .write()
            .await
            .insert(subscription_id.clone(), handle);

        Ok(subscription_id)
    }

    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;

        if let Some(handle) = subscriptions.remove(subscription_id) {
            handle.abort();
            info!("Unsubscribed: {}", subscription_id);
            Ok(())
        } else {
            Err(Error::NotFound(format!("Subscription not found: {}", subscription_id)).into())
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
