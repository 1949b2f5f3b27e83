//! HTTP server setup: router and graceful shutdown wiring.

use super::state::ApiState;
use super::{audit, backup, events, llm_jobs, memories, reminders, search, settings, system, tasks};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use std::net::SocketAddr;
use std::sync::Arc;

/// Build the full REST router over the given state.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(system::health))
        .route("/memories", post(memories::create_memory))
        .route(
            "/memories/{id}",
            get(memories::get_memory)
                .patch(memories::update_memory)
                .delete(memories::delete_memory),
        )
        .route("/memories/{id}/tags", post(memories::add_tags))
        .route("/memories/{id}/tags/{tag}", axum::routing::delete(memories::delete_tag))
        .route("/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route(
            "/tasks/{id}",
            axum::routing::patch(tasks::update_task).delete(tasks::delete_task),
        )
        .route(
            "/reminders",
            post(reminders::create_reminder).get(reminders::list_reminders),
        )
        .route(
            "/reminders/{id}",
            axum::routing::patch(reminders::update_reminder).delete(reminders::delete_reminder),
        )
        .route("/events", post(events::create_event).get(events::list_events))
        .route("/events/{id}", axum::routing::patch(events::update_event))
        .route("/search", get(search::search))
        .route(
            "/settings/{user_id}",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route("/audit", get(audit::query_audit))
        .route("/llm_jobs", post(llm_jobs::create_job).get(llm_jobs::list_jobs))
        .route(
            "/llm_jobs/{id}",
            get(llm_jobs::get_job).patch(llm_jobs::update_job),
        )
        .route("/backup/status/{user_id}", get(backup::backup_status))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server; resolves when the shutdown signal flips.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<ApiState>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
        {
            tracing::error!(%error, "HTTP server exited with error");
        }
    });

    Ok(handle)
}
