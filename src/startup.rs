use crate::config::RealtimeConfig;
use crate::db::connection::DbPool;
use crate::polls::{add_option, create_poll, get_poll, like_poll, list_polls, vote};
use crate::realtime::{self, Broadcaster, Event};
use axum::{
    Json, Router,
    extract::Extension,
    http::{
        StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    pub fn new(db: DbPool, realtime: RealtimeConfig) -> Self {
        AppState {
            db,
            broadcaster: Arc::new(Broadcaster::new(realtime)),
        }
    }

    /// Best-effort broadcast after a committed mutation. Never fails the
    /// request that triggered it.
    pub fn publish(&self, event: &Event) {
        if let Err(e) = self.broadcaster.publish(event) {
            warn!(event_type = event.kind(), error = %e, "event not broadcast");
        }
    }

    /// Close every live session. Call once the server has stopped accepting
    /// connections.
    pub fn shutdown(&self) {
        self.broadcaster.shutdown();
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let broadcaster = Arc::clone(&app_state.broadcaster);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/polls/", post(create_poll).get(list_polls))
        .route("/polls/:poll_id", get(get_poll))
        .route("/polls/:poll_id/options/", post(add_option))
        .route("/polls/:poll_id/vote/", post(vote))
        .route("/polls/:poll_id/like/", post(like_poll))
        .merge(realtime::routes())
        .layer(Extension(app_state))
        .layer(Extension(broadcaster))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods([
                    axum::http::Method::POST,
                    axum::http::Method::GET,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .fallback(handler_404)
}

async fn root() -> impl IntoResponse {
    Json(json!({"message": "QuickPoll API is running!"}))
}

async fn health(Extension(broadcaster): Extension<Arc<Broadcaster>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "OK",
            "sessions": broadcaster.registry().len(),
        })),
    )
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}

pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
