use std::sync::Arc;

use sqlx::PgPool;

use relay_cache::dedupe::DedupeStore;
use relay_cache::lock::MessageLock;
use relay_cache::ratelimit::RateLimiter;
use relay_cache::{InvalidationBus, Kv};
use relay_domain::config::Config;
use relay_domain::crypto::EncryptionKey;
use relay_memory::{Embedder, MemoryStore};
use relay_pipeline::PgDeliveryStore;
use relay_providers::LlmProvider;
use relay_queue::{JobEvents, PgJobStore};
use relay_sessions::PgChannelStore;

use crate::stores::{
    PgCredentialStore, PgDenylistStore, PgPersonaStore, PgPersonalityStore, PgUserPersonalityConfigStore,
    PgUserStore,
};

/// Shared application state passed to every HTTP handler and to the worker
/// loop. Fields are grouped by the four subsystems (spec §2).
///
/// - **Durable storage** — every `Pg*Store` this process reads/writes
/// - **Cache & invalidation fabric** — the shared KV client, the bus, and
///   the dedup/rate-limit/lock primitives built on top of it
/// - **Generation pipeline dependencies** — everything `run_generation`
///   needs but does not own
/// - **Security** — the service-token digest computed once at startup
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Durable storage ──────────────────────────────────────────────
    pub db: PgPool,
    pub jobs: Arc<PgJobStore>,
    pub deliveries: Arc<PgDeliveryStore>,
    pub channels: Arc<PgChannelStore>,
    /// Terminal-event notification for `waitUntilFinished` (spec §4.2), keyed
    /// by job id. Populated by the worker loop after `complete`/`fail`.
    pub job_events: Arc<JobEvents>,
    pub users: Arc<PgUserStore>,
    pub personas: Arc<PgPersonaStore>,
    pub personalities: Arc<PgPersonalityStore>,
    pub credentials: Arc<PgCredentialStore>,
    pub user_personality_configs: Arc<PgUserPersonalityConfigStore>,
    pub denylist: Arc<PgDenylistStore>,

    // ── Cache & invalidation fabric ───────────────────────────────────
    pub kv: Kv,
    pub invalidation: Arc<InvalidationBus>,
    pub dedupe: Arc<DedupeStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub message_lock: Arc<MessageLock>,

    // ── Generation pipeline dependencies ──────────────────────────────
    // `PersonaResolver` itself isn't stored here: there's no persisted
    // per-personality persona-link table, so the job handler builds one per
    // request from the user's owned personas.
    pub memory_store: Arc<dyn MemoryStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmProvider>,
    pub encryption_key: Option<Arc<EncryptionKey>>,
    /// System key used for every guest-mode request (spec §4.3 stage 3).
    pub guest_api_key: Arc<str>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of `INTERNAL_SERVICE_SECRET`. `None` = dev mode, every
    /// protected route is open.
    pub service_token_hash: Option<Vec<u8>>,
}
