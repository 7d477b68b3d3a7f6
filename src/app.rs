use crate::{
    config::Config, labels::ClassLabels, model_service::ModelService,
    ort_service::OrtModelService, server::HttpServer,
};
use std::sync::Arc;

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let labels = match ClassLabels::load(&config.labels) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!("Failed to load class labels: {:?}", e);
            return Err(e.into());
        }
    };

    let model_service: Arc<dyn ModelService> = match OrtModelService::new(&config.model, labels) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!("Failed to initialize model service: {:?}", e);
            return Err(e.into());
        }
    };

    let server = HttpServer::new(model_service, &config).await?;
    server.run().await
}
