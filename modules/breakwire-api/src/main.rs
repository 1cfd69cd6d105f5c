use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use breakwire_common::{Config, EngineConfig};
use breakwire_engine::{
    DecayDetector, IntakeEngine, Scheduler, SettlementEngine, StoredMetricSource, ViralityTracker,
};
use breakwire_store::{ReadCache, Store};

mod rest;

/// Read-cache TTL. Invalidation on writes makes this a backstop, not the
/// primary freshness mechanism.
const CACHE_TTL: Duration = Duration::from_secs(60);

pub struct AppState {
    pub store: Store,
    pub intake: IntakeEngine,
    pub settlement: SettlementEngine,
    pub detector: DecayDetector,
    pub cache: Arc<ReadCache>,
    pub engine_config: EngineConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("breakwire=info".parse()?))
        .init();

    let config = Config::from_env();
    config.engine.validate()?;

    let store = Store::connect(&config.database_url).await?;
    store.ensure_schema().await?;

    let provider = Arc::new(
        OpenAi::new(&config.provider_api_key)
            .with_base_url(&config.provider_base_url)
            .with_embedding_model(&config.embedding_model)
            .with_extraction_model(&config.extraction_model)
            .with_timeout(Duration::from_secs(config.provider_timeout_secs)),
    );

    let cache = Arc::new(ReadCache::new(CACHE_TTL));
    let intake = IntakeEngine::new(
        store.clone(),
        provider.clone(),
        provider,
        config.engine.matching.clone(),
        cache.clone(),
    );
    let settlement = SettlementEngine::new(
        store.clone(),
        config.engine.virality.clone(),
        config.engine.kudos.clone(),
        cache.clone(),
    );

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        ViralityTracker::new(
            store.clone(),
            StoredMetricSource::new(store.clone()),
            config.engine.virality.clone(),
        ),
        SettlementEngine::new(
            store.clone(),
            config.engine.virality.clone(),
            config.engine.kudos.clone(),
            cache.clone(),
        ),
        cache.clone(),
        Duration::from_secs(config.virality_interval_secs),
        Duration::from_secs(config.settlement_interval_secs),
    ));
    scheduler.start().await;

    let state = Arc::new(AppState {
        store,
        intake,
        settlement,
        detector: DecayDetector::new(config.engine.virality.clone()),
        cache,
        engine_config: config.engine.clone(),
    });

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/api/match-check", post(rest::api_match_check))
        .route("/api/submissions", post(rest::api_submit))
        .route("/api/stories/{id}", get(rest::api_story_detail))
        .route("/api/stories/{id}/virality", get(rest::api_story_virality))
        .route("/api/leaderboard/weekly", get(rest::api_leaderboard_weekly))
        .route("/api/leaderboard/alltime", get(rest::api_leaderboard_alltime))
        .route("/api/users/{id}/reputation", get(rest::api_user_reputation))
        .route("/api/admin/stories/{id}/settle", post(rest::api_admin_settle))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!(%addr, "breakwire API listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler.clone()))
        .await?;
    Ok(())
}

/// Wait for ctrl-c, then drain the scheduler before the server exits.
async fn shutdown_signal(scheduler: Arc<Scheduler>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("Shutdown requested, draining scheduler");
    scheduler.stop().await;
}
