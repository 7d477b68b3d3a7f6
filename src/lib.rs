mod ort_service;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod labels;
pub mod model_service;
pub mod pipeline;

pub use app::start_app;
