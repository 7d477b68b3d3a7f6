use super::PipelineError;
use ndarray::{Array1, Array2, Axis};
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Deserialize)]
struct PcaFile {
    mean: Vec<f32>,
    components: Vec<Vec<f32>>,
}

/// A fitted PCA projection: `(x - mean) . components^T`.
#[derive(Debug, Clone)]
pub struct Pca {
    mean: Array1<f32>,
    components: Array2<f32>,
}

impl Pca {
    pub fn new(mean: Array1<f32>, components: Array2<f32>) -> Result<Self, PipelineError> {
        if components.ncols() != mean.len() {
            return Err(PipelineError::Basis(format!(
                "components have {} columns but the mean has {} entries",
                components.ncols(),
                mean.len()
            )));
        }
        if components.nrows() == 0 {
            return Err(PipelineError::Basis("no components".to_string()));
        }
        Ok(Self { mean, components })
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| PipelineError::Basis(format!("{}: {}", path.display(), e)))?;
        let pca: PcaFile = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Basis(format!("{}: {}", path.display(), e)))?;

        let n_components = pca.components.len();
        let width = pca.mean.len();
        if let Some(row) = pca.components.iter().position(|c| c.len() != width) {
            return Err(PipelineError::Basis(format!(
                "component {} has {} entries, expected {}",
                row,
                pca.components[row].len(),
                width
            )));
        }

        let flat: Vec<f32> = pca.components.into_iter().flatten().collect();
        let components = Array2::from_shape_vec((n_components, width), flat)
            .map_err(|e| PipelineError::Basis(e.to_string()))?;

        tracing::info!(
            "Loaded PCA basis with {} components over {} inputs",
            n_components,
            width
        );
        Self::new(Array1::from(pca.mean), components)
    }

    pub fn input_len(&self) -> usize {
        self.mean.len()
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Projects a single signal and returns it as a one-row matrix.
    pub fn transform(&self, signal: &Array1<f32>) -> Result<Array2<f32>, PipelineError> {
        if signal.len() != self.input_len() {
            return Err(PipelineError::DimensionMismatch {
                expected: self.input_len(),
                actual: signal.len(),
            });
        }
        let centered = signal - &self.mean;
        let reduced = self.components.dot(&centered);
        Ok(reduced.insert_axis(Axis(0)))
    }
}
