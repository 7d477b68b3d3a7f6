mod analyze;
mod health;
mod metrics;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use analyze::{analyze_ecg, ANALYZER_ROUTE};
pub use health::healthcheck;
pub use metrics::metrics_handler;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route(ANALYZER_ROUTE, post(analyze_ecg))
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler))
}
