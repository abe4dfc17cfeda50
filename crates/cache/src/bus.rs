//! Cache invalidation bus (§4.4): a pub/sub channel on the shared KV
//! transporting typed invalidation events. Each per-process cache registers
//! a subscriber whose handler is a pure function from event to cache
//! mutation; `clearAll` events subsume narrower ones (§5, §8 property 4).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use relay_domain::Result;

use crate::kv::Kv;

pub const CHANNEL: &str = "cache_invalidation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    All,
    User(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmConfigScope {
    All,
    User(Uuid),
    Config(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeScope {
    All,
    Admin,
    User(Uuid),
    Personality(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenylistOp {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "data", rename_all = "camelCase")]
pub enum InvalidationEvent {
    ApiKey(KeyScope),
    LlmConfig(LlmConfigScope),
    Persona(KeyScope),
    Cascade(CascadeScope),
    Personality { id: Uuid },
    Channel { id_hash: u64 },
    Denylist(DenylistOp),
}

/// The cache-side mutation a consumer applies in response to an event.
/// `ClearAll` subsumes every narrower variant — handlers must treat it that
/// way regardless of event ordering (§5: "invalidation events MAY be
/// reordered across the bus; handlers must be idempotent").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    ClearAll,
    InvalidateUser(Uuid),
    InvalidateEntity(Uuid),
    Noop,
}

impl InvalidationEvent {
    pub fn mutation(&self) -> Mutation {
        match self {
            InvalidationEvent::ApiKey(KeyScope::All)
            | InvalidationEvent::Persona(KeyScope::All)
            | InvalidationEvent::LlmConfig(LlmConfigScope::All)
            | InvalidationEvent::Cascade(CascadeScope::All) => Mutation::ClearAll,
            InvalidationEvent::ApiKey(KeyScope::User(id))
            | InvalidationEvent::Persona(KeyScope::User(id))
            | InvalidationEvent::LlmConfig(LlmConfigScope::User(id))
            | InvalidationEvent::Cascade(CascadeScope::User(id)) => Mutation::InvalidateUser(*id),
            InvalidationEvent::LlmConfig(LlmConfigScope::Config(id))
            | InvalidationEvent::Cascade(CascadeScope::Personality(id))
            | InvalidationEvent::Personality { id } => Mutation::InvalidateEntity(*id),
            InvalidationEvent::Cascade(CascadeScope::Admin) => Mutation::ClearAll,
            InvalidationEvent::Channel { .. } | InvalidationEvent::Denylist(_) => Mutation::ClearAll,
        }
    }
}

/// A pure function from event to cache mutation. Implementors should not
/// perform I/O beyond the in-process cache they own.
pub trait CacheConsumer: Send + Sync + 'static {
    fn on_event(&self, event: &InvalidationEvent);
}

/// Handle returned by `subscribe`; the asynchronous cleanup function named
/// in spec §4.4.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub async fn unsubscribe(self) {
        self.handle.abort();
    }
}

/// Fans out invalidation events published on the shared KV to every
/// in-process subscriber. The redis pub/sub listener reconnects with the
/// same backoff policy as the database notification bridge (§4.4 ambient
/// addition); tests can bypass redis entirely via `publish_local`.
pub struct InvalidationBus {
    tx: broadcast::Sender<InvalidationEvent>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { tx }
    }

    /// Starts the background redis subscriber loop, reconnecting with
    /// exponential backoff (1s -> 60s ceiling, 20 attempts) on disconnect,
    /// matching the database notification bridge's policy.
    pub fn spawn_listener(self: &Arc<Self>, redis_url: String) {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            crate::db_bridge::with_backoff("redis-invalidation-subscriber", 20, || {
                let bus = Arc::clone(&bus);
                let redis_url = redis_url.clone();
                async move { bus.listen_once(&redis_url).await }
            })
            .await;
        });
    }

    async fn listen_once(&self, redis_url: &str) -> Result<()> {
        let client = redis::Client::open(redis_url).map_err(|e| relay_domain::Error::Other(e.to_string()))?;
        let conn = client
            .get_async_connection()
            .await
            .map_err(|e| relay_domain::Error::Other(e.to_string()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(CHANNEL)
            .await
            .map_err(|e| relay_domain::Error::Other(e.to_string()))?;
        let mut stream = pubsub.on_message();
        use futures_util::StreamExt;
        while let Some(msg) = stream.next().await {
            let payload: String = msg
                .get_payload()
                .map_err(|e| relay_domain::Error::Other(e.to_string()))?;
            match serde_json::from_str::<InvalidationEvent>(&payload) {
                Ok(event) => {
                    let _ = self.tx.send(event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed invalidation event");
                }
            }
        }
        Ok(())
    }

    /// Publishes an event on the shared KV; application write paths call
    /// this inline after a successful commit (§4.4 source 1).
    pub async fn publish(&self, kv: &Kv, event: InvalidationEvent) -> Result<()> {
        let payload = serde_json::to_string(&event).map_err(relay_domain::Error::from)?;
        kv.publish(CHANNEL, &payload).await
    }

    /// Delivers an event to subscribers without touching redis — used by
    /// the database notification bridge (which republishes locally after
    /// validating a LISTEN payload) and by tests that intercept subscribe
    /// calls per spec §4.4's test-harness note.
    pub fn publish_local(&self, event: InvalidationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, consumer: Arc<dyn CacheConsumer>) -> Subscription {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => consumer.on_event(&event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}
