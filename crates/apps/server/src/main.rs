use std::sync::Arc;

use anyhow::Context;
use axum::routing::{delete, get, post};
use axum::Router;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod generator;
mod routes;
mod store;

use config::Config;
use generator::{MapGenerator, ProcessGenerator};
use store::ArtifactStore;

#[derive(Clone)]
pub(crate) struct AppState {
    store: Arc<ArtifactStore>,
    generator: Arc<dyn MapGenerator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(
        program = %config.program,
        args = ?config.leading_args,
        timeout_secs = config.timeout.as_secs(),
        "map generator configured"
    );

    let store = Arc::new(ArtifactStore::new(config.maps_dir()));
    if let Err(err) = store.ensure_dir().await {
        warn!("failed to create artifact store {}: {err}", store.dir().display());
    }

    let state = AppState {
        store,
        generator: Arc::new(ProcessGenerator::from_config(&config)),
    };
    let app = build_router(state);

    let addr = config.addr;
    info!("map server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}

pub(crate) fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS]);

    Router::new()
        .route("/healthz", get(routes::healthz))
        .route(protocol::GENERATE_MAP_PATH, post(routes::generate_map))
        .route(protocol::RESET_MAPS_PATH, delete(routes::reset_maps))
        .nest_service(protocol::MAPS_URL_PREFIX, ServeDir::new(state.store.dir()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
