//! HTTP probing of the inference server.
//!
//! `ServerProbe` never fails: transport errors, timeouts, error statuses and
//! undecodable bodies all fold into a [`HealthSnapshot`] whose optional fields
//! are absent. The `/slots` request only adds detail; it cannot turn a
//! reachable server into an unreachable one.

mod decode;

pub use decode::{HealthFields, SlotCounts, decode_health, decode_slots};

use std::future::Future;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::config::{ConfigError, WatchdogConfig};

/// Outcome of one probe of the inference server.
///
/// Built whole by the probe and immutable afterwards. `None` means unknown,
/// never zero or false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub reachable: bool,
    pub model_loaded: Option<bool>,
    pub active_slots: Option<u64>,
    pub total_slots: Option<u64>,
    /// HTTP requests sent upstream while building this snapshot.
    pub requests_issued: u64,
}

impl HealthSnapshot {
    pub fn unreachable(requests_issued: u64) -> Self {
        Self {
            requests_issued,
            ..Self::default()
        }
    }
}

/// Source of health snapshots for the watchdog.
pub trait HealthProbe: Send + Sync {
    fn check_health(&self) -> impl Future<Output = HealthSnapshot> + Send;
}

#[derive(Debug)]
enum FetchError {
    Transport(reqwest::Error),
    Status(StatusCode),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transport(e) if e.is_timeout() => write!(f, "timed out"),
            FetchError::Transport(e) => write!(f, "transport error: {}", e),
            FetchError::Status(status) => write!(f, "unexpected status {}", status),
        }
    }
}

/// Probes `{base}/health` and `{base}/slots` with a bounded timeout.
#[derive(Debug, Clone)]
pub struct ServerProbe {
    client: reqwest::Client,
    health_url: Url,
    slots_url: Url,
}

impl ServerProbe {
    /// Creates a probe for the server at `base`.
    ///
    /// `timeout` bounds each request from connect to the end of the body.
    pub fn new(base: &Url, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            health_url: endpoint(base, "health")?,
            slots_url: endpoint(base, "slots")?,
        })
    }

    pub fn from_config(config: &WatchdogConfig) -> Result<Self, ConfigError> {
        Self::new(&config.parse_target_url()?, config.timeout)
    }

    pub fn health_url(&self) -> &Url {
        &self.health_url
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = response.bytes().await.map_err(FetchError::Transport)?;
        Ok(body.to_vec())
    }

    /// Probes health, then slot detail when the server is reachable.
    pub async fn probe(&self) -> HealthSnapshot {
        let body = match self.fetch(&self.health_url).await {
            Ok(body) => body,
            Err(e) => {
                debug!(url = %self.health_url, error = %e, "health probe failed");
                return HealthSnapshot::unreachable(1);
            }
        };
        let health = decode_health(&body);

        let slots = match self.fetch(&self.slots_url).await {
            Ok(body) => decode_slots(&body),
            Err(e) => {
                debug!(url = %self.slots_url, error = %e, "slots probe failed");
                None
            }
        };

        HealthSnapshot {
            reachable: true,
            model_loaded: health.model_loaded,
            active_slots: slots.map(|s| s.active).or(health.active_slots),
            total_slots: slots.map(|s| s.total).or(health.total_slots),
            requests_issued: 2,
        }
    }
}

impl HealthProbe for ServerProbe {
    fn check_health(&self) -> impl Future<Output = HealthSnapshot> + Send {
        self.probe()
    }
}

/// Joins `name` under `base`, keeping any path prefix on the base URL.
fn endpoint(base: &Url, name: &str) -> Result<Url, ConfigError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(name)
        .map_err(|e| ConfigError::InvalidTargetUrl(format!("{}: {}", base, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;

    async fn serve(app: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    fn probe(base: &Url) -> ServerProbe {
        ServerProbe::new(base, Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_prefix() {
        let base = Url::parse("http://gw.local:9000/llama").unwrap();
        assert_eq!(
            endpoint(&base, "health").unwrap().as_str(),
            "http://gw.local:9000/llama/health"
        );
        let base = Url::parse("http://127.0.0.1:8080").unwrap();
        assert_eq!(
            endpoint(&base, "slots").unwrap().as_str(),
            "http://127.0.0.1:8080/slots"
        );
    }

    #[tokio::test]
    async fn test_probe_healthy_server() {
        let app = Router::new()
            .route("/health", get(|| async { r#"{"status":"ok"}"# }))
            .route(
                "/slots",
                get(|| async {
                    r#"[{"id":0,"is_processing":true},{"id":1,"is_processing":false},{"id":2,"is_processing":true}]"#
                }),
            );
        let base = serve(app).await;

        let snapshot = probe(&base).check_health().await;
        assert_eq!(
            snapshot,
            HealthSnapshot {
                reachable: true,
                model_loaded: Some(true),
                active_slots: Some(2),
                total_slots: Some(3),
                requests_issued: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_probe_error_status_is_unreachable() {
        let app = Router::new().route(
            "/health",
            get(|| async {
                (
                    AxumStatus::SERVICE_UNAVAILABLE,
                    r#"{"error":{"code":503,"message":"Loading model"}}"#,
                )
            }),
        );
        let base = serve(app).await;

        assert_eq!(probe(&base).probe().await, HealthSnapshot::unreachable(1));
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let base = Url::parse(&format!("http://{}", addr)).unwrap();

        let snapshot = probe(&base).probe().await;
        assert!(!snapshot.reachable);
        assert_eq!(snapshot.model_loaded, None);
        assert_eq!(snapshot.active_slots, None);
    }

    #[tokio::test]
    async fn test_probe_health_timeout() {
        let app = Router::new().route(
            "/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                r#"{"status":"ok"}"#
            }),
        );
        let base = serve(app).await;
        let probe = ServerProbe::new(&base, Duration::from_millis(100)).unwrap();

        let started = std::time::Instant::now();
        let snapshot = probe.probe().await;
        assert!(!snapshot.reachable);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_probe_non_json_health_stays_reachable() {
        let app = Router::new().route("/health", get(|| async { "OK" }));
        let base = serve(app).await;

        let snapshot = probe(&base).probe().await;
        assert!(snapshot.reachable);
        assert_eq!(snapshot.model_loaded, None);
        assert_eq!(snapshot.active_slots, None);
        assert_eq!(snapshot.total_slots, None);
    }

    #[tokio::test]
    async fn test_missing_slots_keeps_health_counts() {
        let app = Router::new().route(
            "/health",
            get(|| async { r#"{"status":"ok","slots_idle":3,"slots_processing":1}"# }),
        );
        let base = serve(app).await;

        let snapshot = probe(&base).probe().await;
        assert!(snapshot.reachable);
        assert_eq!(snapshot.model_loaded, Some(true));
        assert_eq!(snapshot.active_slots, Some(1));
        assert_eq!(snapshot.total_slots, Some(4));
        assert_eq!(snapshot.requests_issued, 2);
    }

    #[tokio::test]
    async fn test_slow_slots_cannot_unconfirm_liveness() {
        let app = Router::new()
            .route("/health", get(|| async { r#"{"status":"ok"}"# }))
            .route(
                "/slots",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "[]"
                }),
            );
        let base = serve(app).await;
        let probe = ServerProbe::new(&base, Duration::from_millis(200)).unwrap();

        let snapshot = probe.probe().await;
        assert!(snapshot.reachable);
        assert_eq!(snapshot.model_loaded, Some(true));
        assert_eq!(snapshot.active_slots, None);
    }

    #[tokio::test]
    async fn test_probe_under_path_prefix() {
        let app = Router::new()
            .route("/llama/health", get(|| async { r#"{"status":"error"}"# }))
            .route("/llama/slots", get(|| async { r#"{"unexpected":true}"# }));
        let base = serve(app).await.join("/llama").unwrap();

        let snapshot = probe(&base).probe().await;
        assert!(snapshot.reachable);
        assert_eq!(snapshot.model_loaded, Some(false));
        assert_eq!(snapshot.active_slots, None);
        assert_eq!(snapshot.total_slots, None);
    }
}
