use crate::pipeline::PipelineError;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
    #[error("Failed to create ONNX session: {0}")]
    Session(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Prediction worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class_id: usize,
    pub label: String,
}

#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    async fn predict(&self, image_data: Vec<u8>) -> Result<Prediction, ModelError>;
}
