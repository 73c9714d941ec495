use axum::{ routing::{ get, post, put }, Router };
use std::future::Future;
use tower_http::cors::{ Any, CorsLayer };
use tower_http::trace::TraceLayer;

use crate::api::{ self, AppState };

/// HTTP API consumed by the map client
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health))
        .route("/aircraft", get(api::list_aircraft))
        .route("/aircraft/{id}", get(api::get_route))
        .route("/status", get(api::status))
        .route("/sync/retry", post(api::retry))
        .route("/settings", put(api::update_settings))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(
    bind_addr: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static
) -> std::io::Result<()> {
    let app = router(state);

    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}
