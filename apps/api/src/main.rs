use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::store::{ClinicSeed, MemoryStore, StoreProvider};
use shared_config::{AppConfig, StoreBackend};
use shared_database::SupabaseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic booking API server");

    let config = Arc::new(AppConfig::from_env());
    let stores = build_stores(&config).await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), stores)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn build_stores(config: &AppConfig) -> anyhow::Result<StoreProvider> {
    match config.store_backend {
        StoreBackend::Supabase => {
            info!("Using Supabase store at {}", config.supabase_url);
            Ok(StoreProvider::Supabase(Arc::new(SupabaseClient::new(config))))
        }
        StoreBackend::Memory => {
            let store = match &config.booking_seed_file {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("failed to read seed file {}", path))?;
                    let seed: ClinicSeed = serde_json::from_str(&raw)
                        .with_context(|| format!("invalid seed file {}", path))?;
                    info!(
                        "Seeded memory store with {} users, {} branches, {} time slots",
                        seed.users.len(),
                        seed.branches.len(),
                        seed.time_slots.len()
                    );
                    MemoryStore::from_seed(seed).await
                }
                None => {
                    warn!("Memory store started empty; set BOOKING_SEED_FILE to load users and slots");
                    MemoryStore::new()
                }
            };
            Ok(StoreProvider::Memory(Arc::new(store)))
        }
    }
}
