use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct HealthStatus {
    status: String,
    version: String,
}

pub async fn healthcheck() -> impl IntoResponse {
    Json(HealthStatus {
        status: "Available".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
