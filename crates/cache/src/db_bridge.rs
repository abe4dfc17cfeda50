//! Database Notification Bridge (§4.4 source 2): LISTENs on
//! `cache_invalidation`, validates each payload, and republishes it on the
//! KV bus. Reconnects with exponential backoff starting at 1s, doubling to
//! a 60s ceiling, giving up after 20 attempts, logging structured
//! reason-for-failure at each step.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgListener;

use relay_domain::Result;

use crate::bus::InvalidationBus;

pub const DB_LISTEN_CHANNEL: &str = "cache_invalidation";
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
pub const MAX_ATTEMPTS: u32 = 20;

/// Runs `attempt` in a loop, doubling the delay between failures from
/// `INITIAL_BACKOFF` up to `MAX_BACKOFF`, giving up after `max_attempts`.
/// Shared by the DB bridge and the redis invalidation subscriber — both
/// need the identical resilience discipline (§4.4 ambient addition).
pub async fn with_backoff<F, Fut>(label: &str, max_attempts: u32, mut attempt: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut delay = INITIAL_BACKOFF;
    for attempt_no in 1..=max_attempts {
        match attempt().await {
            Ok(()) => return,
            Err(e) => {
                tracing::warn!(
                    target: "cache_bridge",
                    label,
                    attempt_no,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "connection attempt failed, backing off"
                );
                if attempt_no == max_attempts {
                    tracing::error!(target: "cache_bridge", label, "giving up after {max_attempts} attempts");
                    return;
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Connects to the relational DB and republishes validated
/// `cache_invalidation` payloads on the shared `InvalidationBus`.
pub async fn run(database_url: String, bus: Arc<InvalidationBus>) {
    with_backoff("db-notification-bridge", MAX_ATTEMPTS, || {
        let database_url = database_url.clone();
        let bus = Arc::clone(&bus);
        async move { listen_once(&database_url, &bus).await }
    })
    .await;
}

async fn listen_once(database_url: &str, bus: &InvalidationBus) -> Result<()> {
    let mut listener = PgListener::connect(database_url)
        .await
        .map_err(|e| relay_domain::Error::Other(format!("db listen connect: {e}")))?;
    listener
        .listen(DB_LISTEN_CHANNEL)
        .await
        .map_err(|e| relay_domain::Error::Other(format!("db LISTEN {DB_LISTEN_CHANNEL}: {e}")))?;

    loop {
        let notification = listener
            .recv()
            .await
            .map_err(|e| relay_domain::Error::Other(format!("db notification recv: {e}")))?;
        match serde_json::from_str::<crate::bus::InvalidationEvent>(notification.payload()) {
            Ok(event) => bus.publish_local(event),
            Err(e) => {
                tracing::warn!(error = %e, payload = notification.payload(), "dropping invalid LISTEN payload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        with_backoff("test", 3, move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(relay_domain::Error::Other("always fails".into()))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_on_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        with_backoff("test", 20, move || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 1 {
                    Err(relay_domain::Error::Other("transient".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
