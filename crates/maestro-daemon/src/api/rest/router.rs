//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // liveness
        .route("/ping", get(handlers::ping))
        .route("/healthcheck", get(handlers::healthcheck))
        .route("/status", get(handlers::daemon_status))
        // global lock
        .route("/lock", get(handlers::lock_state))
        .route("/lock", post(handlers::set_lock))
        .route("/lock", delete(handlers::clear_lock))
        // deployments
        .route("/deployments", get(handlers::list_deployments))
        .route("/deployments/:id", get(handlers::get_deployment))
        .route("/deployments/:id/tasks", get(handlers::deployment_tasks))
        .route("/deployments/:id/logs", get(handlers::deployment_logs))
        // applications
        .route("/applications", get(handlers::list_applications))
        .route("/applications/:app", get(handlers::get_application))
        .route("/applications/:app", put(handlers::upsert_application))
        // deployment operations
        .route("/applications/:app/:env/deploy", post(handlers::deploy))
        .route("/applications/:app/:env/undo", post(handlers::undo))
        .route("/applications/:app/:env/rollback", post(handlers::rollback))
        .route("/applications/:app/:env/pause", post(handlers::register_pause))
        .route(
            "/applications/:app/:env/pause",
            delete(handlers::unregister_pause),
        )
        .route("/applications/:app/:env/resume", post(handlers::resume))
        // collections
        .route("/environments", get(handlers::environments))
        .route("/in-progress", get(handlers::in_progress))
        .route("/paused", get(handlers::paused))
        .route("/awaiting-pause", get(handlers::awaiting_pause))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
