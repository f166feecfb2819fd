//! HTTP handlers for the exposition endpoint.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use llamawatch_core::registry::CONTENT_TYPE;

use crate::state::AppState;

/// `GET /metrics`: current registry contents in Prometheus text format.
///
/// Always 200. Reads atomics only, so it never waits on a running cycle.
pub(crate) async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], state.registry.render())
}

/// `GET /healthz`: liveness of the exporter itself.
pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use llamawatch_core::registry::{BuildInfo, Counter, Gauge, MetricsRegistry};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let registry = MetricsRegistry::new(&BuildInfo {
            version: "0.1.0 (test)".into(),
            model_path: "/models/model.gguf".into(),
            target_url: "http://127.0.0.1:8080/".into(),
        })
        .unwrap();
        AppState {
            registry: Arc::new(registry),
        }
    }

    async fn get(state: AppState, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state();
        state.registry.set_flag(Gauge::Up, true);
        state.registry.set_gauge(Gauge::ActiveSlots, 2.0);
        state.registry.increment_counter(Counter::RequestsTotal, 4);

        let (status, content_type, body) = get(state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(CONTENT_TYPE));
        assert!(body.lines().any(|l| l == "up 1"));
        assert!(body.lines().any(|l| l == "active_slots 2"));
        assert!(body.lines().any(|l| l == "requests_total 4"));
        assert!(body.contains("# HELP cpu_usage_percent "));
        assert!(body.contains(r#"model_path="/models/model.gguf""#));
    }

    #[tokio::test]
    async fn test_metrics_before_first_cycle() {
        let (status, _, body) = get(state(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.lines().any(|l| l == "up 0"));
        assert!(body.lines().any(|l| l == "watchdog_cycles_completed_total 0"));
    }

    #[tokio::test]
    async fn test_healthz() {
        let (status, _, body) = get(state(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let (status, _, _) = get(state(), "/slots").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
