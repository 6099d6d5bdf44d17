use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::warn;

use crate::queue::Queue;

#[derive(Clone)]
pub struct AppState {
    pub queue: Queue,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/queues", get(queues_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn queues_handler(State(state): State<AppState>) -> Response {
    match state.queue.counts().await {
        Ok(counts) => axum::Json(counts).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to read queue counts");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::db;
    use crate::queue::JobOptions;

    async fn app() -> (tempfile::TempDir, Queue, Router) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_at(&dir.path().join("server.db")).await.unwrap();
        let queue = Queue::new(pool);
        let router = build_router(AppState { queue: queue.clone() });
        (dir, queue, router)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_dir, _queue, router) = app().await;
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn queues_reports_counts() {
        let (_dir, queue, router) = app().await;
        queue
            .enqueue("sources.rss-fetcher", "collect", &serde_json::json!({}), &JobOptions::default())
            .await
            .unwrap();

        let response = router
            .oneshot(Request::get("/queues").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["sources.rss-fetcher"]["waiting"], 1);
        assert_eq!(json["sources.rss-fetcher"]["active"], 0);
    }
}
