//! Route definitions and router construction.

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// All API routes without the `/api` prefix.
fn api_routes() -> Router<AppState> {
    Router::new()
        // Auth
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/verify", get(handlers::auth::verify))
        .route("/auth/password", post(handlers::auth::change_password))
        // Jobs
        .route("/downloads", get(handlers::downloads::list))
        .route("/stats", get(handlers::downloads::stats))
        .route("/retry", post(handlers::downloads::retry))
        .route("/stop", post(handlers::downloads::stop))
        .route("/delete", post(handlers::downloads::delete))
        // URL intake
        .route("/url/check", post(handlers::url::check))
        .route("/url/download", post(handlers::url::download))
        // Source routing
        .route(
            "/mappings",
            get(handlers::mappings::list).post(handlers::mappings::create),
        )
        .route(
            "/mappings/{id}",
            put(handlers::mappings::update).delete(handlers::mappings::delete),
        )
        // Provider config
        .route(
            "/config",
            get(handlers::config::get).put(handlers::config::put),
        )
        // Media
        .route("/video/check/{id}", get(handlers::video::check))
        .route("/video/stream/{id}", get(handlers::video::stream))
        // Event channel
        .route("/events", get(ws::events))
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes())
        .layer(cors)
        .with_state(state)
}
