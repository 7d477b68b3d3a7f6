//! Turns an uploaded ECG printout into the feature vector the classifier
//! was trained on.
//!
//! The stages run in a fixed order: decode, grayscale and normalise the
//! sheet, crop the twelve leads, binarize each lead, trace its waveform into
//! a scaled 1D signal, concatenate the leads and project the result onto the
//! pretrained PCA basis.

mod pca;
mod sheet;
mod signal;

pub use pca::Pca;
pub use sheet::{divide_leads, read_sheet, LEAD_COUNT, SHEET_HEIGHT, SHEET_WIDTH};
pub use signal::{combine_signals, extract_signal, preprocess_lead, SAMPLES_PER_LEAD};

use ndarray::Array2;
use thiserror::Error;

/// Length of the combined signal fed to the dimensionality reduction.
pub const SIGNAL_LEN: usize = LEAD_COUNT * SAMPLES_PER_LEAD;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Error decoding image: {0}")]
    Decode(String),
    #[error("No ECG trace found in lead {0}")]
    EmptyLead(usize),
    #[error("Signal has {actual} samples, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Invalid PCA basis: {0}")]
    Basis(String),
}

impl PipelineError {
    /// Whether the failure comes from the uploaded image rather than from
    /// the service's own artifacts.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, PipelineError::Decode(_) | PipelineError::EmptyLead(_))
    }
}

#[derive(Debug, Clone)]
pub struct EcgPipeline {
    pca: Pca,
}

impl EcgPipeline {
    pub fn new(pca: Pca) -> Result<Self, PipelineError> {
        if pca.input_len() != SIGNAL_LEN {
            return Err(PipelineError::Basis(format!(
                "basis expects {} inputs but the combined signal has {}",
                pca.input_len(),
                SIGNAL_LEN
            )));
        }
        Ok(Self { pca })
    }

    pub fn n_components(&self) -> usize {
        self.pca.n_components()
    }

    /// Runs every image-processing stage and returns a `[1, n_components]`
    /// feature matrix.
    pub fn features(&self, image_data: &[u8]) -> Result<Array2<f32>, PipelineError> {
        let sheet = read_sheet(image_data)?;
        let leads = divide_leads(&sheet);

        let signals = leads
            .iter()
            .enumerate()
            .map(|(index, lead)| {
                let binary = preprocess_lead(lead);
                extract_signal(&binary).ok_or(PipelineError::EmptyLead(index + 1))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let combined = combine_signals(&signals);
        tracing::debug!("Extracted {} samples from {} leads", combined.len(), leads.len());

        self.pca.transform(&combined)
    }
}
