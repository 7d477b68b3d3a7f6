use crate::{
    config::{Config, CorsConfig, UploadConfig},
    model_service::ModelService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

/// Room left in the request body for multipart boundaries and part headers on
/// top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct SharedState {
    pub model_service: Arc<dyn ModelService>,
    pub upload_config: UploadConfig,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: SharedState, cors_config: &CorsConfig) -> Router {
    let body_limit = state.upload_config.max_file_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_config))
}

fn cors_layer(cors_config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if cors_config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors_config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin {}: {}", origin, e);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        model_service: Arc<dyn ModelService>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let app_state = SharedState {
            model_service,
            upload_config: config.upload.clone(),
            metrics: Arc::new(
                Metrics::new().map_err(|e| anyhow::anyhow!("failed to register metrics: {}", e))?,
            ),
        };

        let router = build_router(app_state, &config.cors);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown");
            })
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_service::{ModelError, Prediction};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    struct FixedModelService;

    #[async_trait]
    impl ModelService for FixedModelService {
        async fn predict(&self, _image_data: Vec<u8>) -> Result<Prediction, ModelError> {
            Ok(Prediction {
                class_id: 2,
                label: "Your ECG is Normal".to_string(),
            })
        }
    }

    fn router_with_origins(allowed_origins: &[&str]) -> Router {
        let state = SharedState {
            model_service: Arc::new(FixedModelService),
            upload_config: UploadConfig::default(),
            metrics: Arc::new(Metrics::new().unwrap()),
        };
        let cors_config = CorsConfig {
            allowed_origins: allowed_origins.iter().map(|o| o.to_string()).collect(),
        };
        build_router(state, &cors_config)
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/analyzer")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_preflight_allows_any_origin_by_default() {
        let response = router_with_origins(&[])
            .oneshot(preflight("http://localhost:3000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_preflight_echoes_listed_origin() {
        let response = router_with_origins(&["http://localhost:3000"])
            .oneshot(preflight("http://localhost:3000"))
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        let allowed_methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap();
        assert!(allowed_methods.contains("POST"));
    }

    #[tokio::test]
    async fn test_unlisted_origin_gets_no_cors_header() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::empty())
            .unwrap();

        let response = router_with_origins(&["http://localhost:3000"])
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
