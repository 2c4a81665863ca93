//! harmony-nest HTTP Server
//!
//! Axum-based server exposing the couple/streak API and the Pix
//! payment proxy endpoints.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nest_payments::{HttpPixGateway, PixGateway};
use nest_store::{MemoryStore, NestStore, RestStore};

use crate::handlers::{
    activate, add_reward, create_checkout, delete_reward, get_couple, health_check, join,
    list_rewards, login, payment_status, reset_streak, update_couple,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize the row store
    let (store, store_kind): (Arc<dyn NestStore>, &'static str) = match RestStore::from_env() {
        Ok(store) => {
            tracing::info!("✓ Row store configured");
            (Arc::new(store), "rest")
        }
        Err(e) => {
            tracing::warn!("⚠ Row store not configured - using in-memory store: {}", e);
            tracing::warn!("  Set NEST_STORE_URL and NEST_STORE_KEY in .env");
            (Arc::new(MemoryStore::new()), "memory")
        }
    };

    // Initialize the payment gateway
    let gateway: Option<Arc<dyn PixGateway>> = match HttpPixGateway::from_env() {
        Ok(gateway) => Some(Arc::new(gateway)),
        Err(_) => None,
    };

    if gateway.is_some() {
        tracing::info!("✓ Pix gateway configured");
    } else {
        tracing::warn!("⚠ Pix gateway not configured - payments disabled");
        tracing::warn!("  Set PIX_ACCESS_TOKEN in .env");
    }

    // Build application state
    let state = AppState {
        store,
        store_kind,
        gateway,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health
        .route("/health", get(health_check))

        // Identity
        .route("/api/login", post(login))
        .route("/api/join", post(join))

        // Couples & rewards
        .route("/api/couples/{id}", get(get_couple).patch(update_couple))
        .route("/api/couples/{id}/reset", post(reset_streak))
        .route("/api/couples/{id}/rewards", get(list_rewards).post(add_reward))
        .route("/api/rewards/{id}", delete(delete_reward))

        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/api/payment/status", post(payment_status))
        .route("/api/activate", post(activate))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 harmony-nest server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                    - Health check");
    tracing::info!("  POST   /api/login                 - Look up by email");
    tracing::info!("  POST   /api/join                  - Join a couple by invite code");
    tracing::info!("  GET    /api/couples/:id           - Fetch a couple");
    tracing::info!("  PATCH  /api/couples/:id           - Update a couple");
    tracing::info!("  POST   /api/couples/:id/reset     - Reset the harmony streak");
    tracing::info!("  GET    /api/couples/:id/rewards   - List rewards");
    tracing::info!("  POST   /api/couples/:id/rewards   - Add a reward");
    tracing::info!("  DELETE /api/rewards/:id           - Delete a reward");
    tracing::info!("  POST   /api/checkout              - Create a Pix charge");
    tracing::info!("  POST   /api/payment/status        - Check charge settlement");
    tracing::info!("  POST   /api/activate              - Activate after payment");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
