use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mindsync::{
    actors::ActorConfig,
    api,
    catalog::{CardCatalog, CatalogConfig, LOCAL_CARD_ROUTE},
    embedding::EmbeddingConfig,
    state::AppState,
    store::MemoryStore,
    words::WordPool,
    ws,
};

#[derive(Debug, Clone)]
struct ServerConfig {
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(5000);
        Self { port }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mindsync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mind Sync...");

    let server_config = ServerConfig::from_env();
    let catalog_config = CatalogConfig::from_env();

    let catalog = match CardCatalog::load(&catalog_config) {
        Ok(catalog) => {
            tracing::info!("Loaded {} cards", catalog.len());
            catalog
        }
        Err(e) => {
            tracing::warn!("{}. Games cannot start until cards are available.", e);
            CardCatalog::new(Vec::new(), catalog_config.external_image_url.clone())
        }
    };

    let state = Arc::new(
        AppState::new(Arc::new(MemoryStore::new()))
            .with_catalog(catalog)
            .with_embeddings(EmbeddingConfig::from_env().build_provider())
            .with_words(WordPool::from_env())
            .with_actor_config(ActorConfig::from_env()),
    );

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api::routes())
        .nest_service(
            LOCAL_CARD_ROUTE,
            ServeDir::new(&catalog_config.static_cards_path),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
