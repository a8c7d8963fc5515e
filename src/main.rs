//! Process entry point, mirroring the teacher's `main.rs` structure: env/tracing
//! setup, collaborator construction, background worker spawn, router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use duel_server::actors::registry::MatchRegistry;
use duel_server::config::Config;
use duel_server::db::{init_db_default, PostgresPersistence};
use duel_server::gateway::{self, GatewayState};
use duel_server::health::{self, HealthState};
use duel_server::identity::{CachedIdentityProvider, HttpIdentityProvider};
use duel_server::matchmaking::pool::WaitingPool;
use duel_server::matchmaking::{MatchmakerDeps, MatchmakerLoop};
use duel_server::metrics::{self, MetricsRecorder};
use duel_server::middleware::logging::log_requests;
use duel_server::presence::PresenceRegistry;
use duel_server::problems::HttpProblemRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Arc::new(Config::default());
    info!(port = config.server_port, "starting duel server");

    let recorder = MetricsRecorder::new();
    let prometheus_handle = recorder.handle().clone();

    let db_pool = init_db_default().await?;

    let pool = Arc::new(Mutex::new(WaitingPool::new()));
    let presence = Arc::new(PresenceRegistry::new(pool.clone()));
    let registry = Arc::new(MatchRegistry::new());

    let identity_base_url =
        std::env::var("IDENTITY_SERVICE_URL").unwrap_or_else(|_| "http://localhost:9000".into());
    let problems_base_url =
        std::env::var("PROBLEMS_SERVICE_URL").unwrap_or_else(|_| "http://localhost:9001".into());

    let identity = Arc::new(CachedIdentityProvider::new(
        Arc::new(HttpIdentityProvider::new(identity_base_url)),
        Duration::from_secs(30),
    ));
    let problems = Arc::new(HttpProblemRepository::new(problems_base_url));
    let persistence = Arc::new(PostgresPersistence::new(db_pool.clone()));

    let matchmaker = MatchmakerLoop::start(MatchmakerDeps {
        pool: pool.clone(),
        presence: presence.clone(),
        registry: registry.clone(),
        problems,
        persistence,
        config: config.clone(),
    });
    let matchmaker_liveness = matchmaker.liveness();

    let gateway_state = GatewayState {
        presence: presence.clone(),
        identity,
    };
    let health_state = HealthState {
        db_pool: db_pool.clone(),
        registry: registry.clone(),
        matchmaker: matchmaker_liveness,
    };

    let gateway_router = Router::new()
        .route("/duel", get(gateway::ws_handler))
        .with_state(gateway_state);

    let health_router = Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(health_state);

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(prometheus_handle);

    let app = Router::new()
        .merge(gateway_router)
        .merge(health_router)
        .merge(metrics_router)
        .layer(axum::middleware::from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server_port)).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let shutdown_registry = registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown_registry.shutdown_all();
        })
        .await?;

    matchmaker.stop().await;
    Ok(())
}
