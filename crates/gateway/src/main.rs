use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use relay_cache::dedupe::DedupeStore;
use relay_cache::lock::MessageLock;
use relay_cache::ratelimit::RateLimiter;
use relay_cache::{InvalidationBus, Kv};
use relay_domain::config::{Config, ConfigSeverity};
use relay_domain::crypto::EncryptionKey;
use relay_domain::types::JobType;
use relay_gateway::api;
use relay_gateway::cli::{Cli, Command, ConfigCommand};
use relay_gateway::state::AppState;
use relay_gateway::stores::{
    PgCredentialStore, PgDenylistStore, PgPersonaStore, PgPersonalityStore, PgUserPersonalityConfigStore,
    PgUserStore,
};
use relay_gateway::worker::GenerationJobHandler;
use relay_memory::{HttpEmbedder, PgMemoryStore};
use relay_pipeline::PgDeliveryStore;
use relay_providers::openrouter::OpenRouterProvider;
use relay_queue::{JobEvents, PgJobStore};
use relay_sessions::PgChannelStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = relay_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = relay_gateway::cli::load_config()?;
            let passed = relay_gateway::cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = relay_gateway::cli::load_config()?;
            let valid = relay_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = relay_gateway::cli::load_config()?;
            relay_gateway::cli::config::show(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,relay_gateway=debug")))
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("relay-gateway starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Persistent storage directories ───────────────────────────────
    std::fs::create_dir_all(&config.storage.avatars_dir)
        .with_context(|| format!("creating {}", config.storage.avatars_dir))?;
    std::fs::create_dir_all(&config.storage.temp_attachments_dir)
        .with_context(|| format!("creating {}", config.storage.temp_attachments_dir))?;

    // ── Postgres pool ─────────────────────────────────────────────────
    let db = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database.database_url)
        .await
        .context("connecting to database")?;
    tracing::info!("database pool ready");

    // ── Redis / cache fabric ──────────────────────────────────────────
    let kv = Kv::connect(&config.cache.redis_url).await.context("connecting to redis")?;
    let invalidation = Arc::new(InvalidationBus::new());
    invalidation.spawn_listener(config.cache.redis_url.clone());
    tracing::info!("cache + invalidation fabric ready");

    // ── Durable stores ────────────────────────────────────────────────
    let jobs = Arc::new(PgJobStore::new(db.clone()));
    let deliveries = Arc::new(PgDeliveryStore::new(db.clone()));
    let channels = Arc::new(PgChannelStore::new(db.clone()));
    let users = Arc::new(PgUserStore::new(db.clone()));
    let personas = Arc::new(PgPersonaStore::new(db.clone()));
    let personalities = Arc::new(PgPersonalityStore::new(db.clone()));
    let credentials = Arc::new(PgCredentialStore::new(db.clone()));
    let user_personality_configs = Arc::new(PgUserPersonalityConfigStore::new(db.clone()));
    let denylist = Arc::new(PgDenylistStore::new(db.clone()));
    let job_events = Arc::new(JobEvents::new());
    tracing::info!("entity stores ready");

    // ── Dedup / rate limit / message lock ─────────────────────────────
    let dedupe = Arc::new(DedupeStore::new(kv.clone(), config.cache.dedup_ttl_secs));
    let rate_limiter = Arc::new(RateLimiter::new(kv.clone()));
    let message_lock = Arc::new(MessageLock::new(kv.clone(), config.cache.cache_ttl_secs));

    // ── Generation pipeline dependencies ──────────────────────────────
    let memory_store = Arc::new(PgMemoryStore::new(db.clone()));
    let embedding_base_url =
        std::env::var("EMBEDDING_BASE_URL").unwrap_or_else(|_| "https://openrouter.ai/api/v1/embeddings".into());
    let embedding_model = std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".into());
    let embedding_api_key = std::env::var("EMBEDDING_API_KEY").unwrap_or_default();
    let embedder = Arc::new(HttpEmbedder::new(embedding_base_url, embedding_model, embedding_api_key));
    let llm = Arc::new(OpenRouterProvider::new());
    let guest_api_key = Arc::from(std::env::var("GUEST_OPENROUTER_API_KEY").unwrap_or_default());

    let encryption_key = config
        .security
        .api_key_encryption_key
        .as_deref()
        .map(EncryptionKey::from_hex)
        .transpose()
        .context("parsing API_KEY_ENCRYPTION_KEY")?
        .map(Arc::new);
    if encryption_key.is_none() {
        tracing::warn!("BYOK credential encryption disabled — only guest-mode generation is available");
    }

    // ── Service-to-service auth token ─────────────────────────────────
    let service_token_hash = match &config.security.internal_service_secret {
        Some(secret) if !secret.is_empty() => {
            tracing::info!("service-to-service auth enabled");
            Some(Sha256::digest(secret.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!("service-to-service auth DISABLED — set INTERNAL_SERVICE_SECRET to enable");
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        db: db.clone(),
        jobs: jobs.clone(),
        deliveries,
        channels,
        job_events: job_events.clone(),
        users,
        personas,
        personalities,
        credentials,
        user_personality_configs,
        denylist,
        kv,
        invalidation,
        dedupe,
        rate_limiter,
        message_lock,
        memory_store,
        embedder,
        llm,
        encryption_key,
        guest_api_key,
        service_token_hash,
    };

    // ── Generation job worker loop ────────────────────────────────────
    {
        let state = state.clone();
        let jobs = jobs.clone();
        let job_events = job_events.clone();
        tokio::spawn(async move {
            let handler: Arc<dyn relay_queue::JobHandler> = Arc::new(GenerationJobHandler { state });
            let shutdown = tokio_util::sync::CancellationToken::new();
            relay_queue::consume(jobs, job_events, JobType::LlmGeneration, handler, 4, shutdown).await;
        });
    }
    tracing::info!("generation job worker started");

    // ── CORS ───────────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.http.cors_origins);

    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(256))
        .with_state(state);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "relay-gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

/// Builds a [`CorsLayer`] from the configured allowed origins. Entries may
/// carry a trailing `:*` wildcard port; a single literal `"*"` allows all
/// origins (spec §6 `CORS_ORIGINS`).
fn build_cors_layer(cors_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    if cors_origins.len() == 1 && cors_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in cors_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
