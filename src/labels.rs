use crate::config::{LabelsConfig, Validatable};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read labels file: {0}")]
    Io(#[from] io::Error),
    #[error("Labels file {0} does not contain any label")]
    Empty(String),
}

/// Diagnosis labels indexed by the class id the classifier emits.
#[derive(Debug, Clone)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn load(labels_cfg: &LabelsConfig) -> Result<Self, LabelsError> {
        let labels = load_labels(&labels_cfg.get_path())?;
        tracing::info!("Loaded {} class labels", labels.len());
        Ok(Self { labels })
    }

    pub fn label_for(&self, class_id: usize) -> String {
        match self.labels.get(class_id) {
            Some(label) => label.clone(),
            None => format!("Unknown class {}", class_id),
        }
    }
}

pub fn load_labels(filepath: &Path) -> Result<Vec<String>, LabelsError> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    if labels.is_empty() {
        return Err(LabelsError::Empty(filepath.display().to_string()));
    }

    Ok(labels)
}
