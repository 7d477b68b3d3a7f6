use crate::{
    config::{ModelConfig, Validatable},
    labels::ClassLabels,
    model_service::{ModelError, ModelService, Prediction},
    pipeline::{EcgPipeline, Pca},
};
use async_trait::async_trait;
use ndarray::Array2;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .reduce(|best, current| if current.1 > best.1 { current } else { best })
        .map(|(index, _)| index)
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    pipeline: Arc<EcgPipeline>,
    labels: Arc<ClassLabels>,
    output_name: String,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig, labels: ClassLabels) -> Result<Self, ModelError> {
        let pca = Pca::load(&model_config.get_pca_path())?;
        let pipeline = EcgPipeline::new(pca)?;

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()
                    .and_then(|builder| {
                        builder.with_optimization_level(GraphOptimizationLevel::Level3)
                    })
                    .and_then(|builder| builder.commit_from_file(model_config.get_path()))
                    .map_err(|e| ModelError::Session(e.to_string()))?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        tracing::info!(
            "Created {} ONNX sessions for a {}-component classifier",
            num_instances,
            pipeline.n_components()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            pipeline: Arc::new(pipeline),
            labels: Arc::new(labels),
            output_name: model_config.output_name.clone(),
        })
    }

    /// Runs the classifier on a `[1, n_components]` feature matrix and
    /// returns the predicted class id.
    pub fn run_inference(&self, features: &Array2<f32>) -> Result<usize, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if features.view().is_standard_layout() {
            features.view()
        } else {
            owned_buffer = features.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| ModelError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let output = outputs.get(&self.output_name).ok_or_else(|| {
            ModelError::Inference(format!("model has no output named {}", self.output_name))
        })?;

        // Classifiers exported with a label output emit int64 ids, the others
        // emit one score per class.
        if let Ok((_, ids)) = output.try_extract_tensor::<i64>() {
            let id = ids
                .first()
                .ok_or_else(|| ModelError::Inference("empty label tensor".to_string()))?;
            return usize::try_from(*id)
                .map_err(|_| ModelError::Inference(format!("negative class id {}", id)));
        }

        let (_, scores) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(format!("failed to extract tensor: {}", e)))?;

        argmax(scores).ok_or_else(|| ModelError::Inference("empty score tensor".to_string()))
    }

    pub fn classify(&self, image_data: &[u8]) -> Result<Prediction, ModelError> {
        let features = self.pipeline.features(image_data)?;
        let class_id = self.run_inference(&features)?;

        Ok(Prediction {
            class_id,
            label: self.labels.label_for(class_id),
        })
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, image_data: Vec<u8>) -> Result<Prediction, ModelError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.classify(&image_data))
            .await
            .map_err(|e| ModelError::Worker(e.to_string()))?
    }
}
